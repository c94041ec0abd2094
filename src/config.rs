use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_LLM_PROXY_URL: &str = "http://llm-proxy.llm.svc.cluster.local:8000/chat";
pub const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt-4o";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_ENERGY_PER_1K_TOKENS_KWH: f64 = 0.001;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Upstream LLM vendor the proxy talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Azure,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Azure => "azure",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" => Ok(Provider::Azure),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Where and how the provider is reached. Each variant carries exactly the
/// credentials its provider needs.
#[derive(Clone)]
pub enum ProviderSettings {
    Azure {
        endpoint: String,
        api_key: String,
        deployment: String,
        api_version: String,
    },
    OpenAi {
        api_base: String,
        api_key: String,
        model: String,
    },
    Anthropic {
        api_base: String,
        api_key: String,
        model: String,
    },
}

impl ProviderSettings {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderSettings::Azure { .. } => Provider::Azure,
            ProviderSettings::OpenAi { .. } => Provider::OpenAi,
            ProviderSettings::Anthropic { .. } => Provider::Anthropic,
        }
    }

    /// Model identifier used in logs, health output and cost lookup.
    pub fn model_name(&self) -> String {
        match self {
            ProviderSettings::Azure { deployment, .. } => format!("azure/{}", deployment),
            ProviderSettings::OpenAi { model, .. } | ProviderSettings::Anthropic { model, .. } => {
                model.clone()
            }
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSettings::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => f
                .debug_struct("Azure")
                .field("endpoint", endpoint)
                .field("api_key", &"[REDACTED]")
                .field("deployment", deployment)
                .field("api_version", api_version)
                .finish(),
            ProviderSettings::OpenAi { api_base, model, .. } => f
                .debug_struct("OpenAi")
                .field("api_base", api_base)
                .field("api_key", &"[REDACTED]")
                .field("model", model)
                .finish(),
            ProviderSettings::Anthropic { api_base, model, .. } => f
                .debug_struct("Anthropic")
                .field("api_base", api_base)
                .field("api_key", &"[REDACTED]")
                .field("model", model)
                .finish(),
        }
    }
}

/// Settings of the guardrail service.
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    pub host: String,
    pub port: u16,
    pub llm_proxy_url: String,
    pub timeout_secs: u64,
}

impl GuardrailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Self {
            host: vars.or("HOST", "0.0.0.0"),
            port: vars.parsed("PORT", 8000)?,
            llm_proxy_url: vars.or("LLM_PROXY_URL", DEFAULT_LLM_PROXY_URL),
            timeout_secs: vars.parsed("LLM_PROXY_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

/// Settings of the llm-proxy service, read once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub provider: ProviderSettings,
    pub energy_per_1k_tokens_kwh: f64,
    pub timeout_secs: u64,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let provider: Provider = vars.or("LLM_PROVIDER", "azure").parse()?;

        let provider = match provider {
            Provider::Azure => ProviderSettings::Azure {
                endpoint: vars.required("AZURE_OPENAI_ENDPOINT")?,
                api_key: vars.required("AZURE_OPENAI_API_KEY")?,
                deployment: vars.or("AZURE_OPENAI_DEPLOYMENT_NAME", DEFAULT_AZURE_DEPLOYMENT),
                api_version: vars.or("AZURE_OPENAI_API_VERSION", DEFAULT_AZURE_API_VERSION),
            },
            Provider::OpenAi => ProviderSettings::OpenAi {
                api_base: vars.or("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
                api_key: vars.required("OPENAI_API_KEY")?,
                model: vars.or("LLM_MODEL", DEFAULT_OPENAI_MODEL),
            },
            Provider::Anthropic => ProviderSettings::Anthropic {
                api_base: vars.or("ANTHROPIC_API_BASE", DEFAULT_ANTHROPIC_API_BASE),
                api_key: vars.required("ANTHROPIC_API_KEY")?,
                model: vars.or("LLM_MODEL", DEFAULT_ANTHROPIC_MODEL),
            },
        };

        Ok(Self {
            host: vars.or("HOST", "0.0.0.0"),
            port: vars.parsed("PORT", 8000)?,
            provider,
            energy_per_1k_tokens_kwh: vars
                .parsed("ENERGY_PER_1K_TOKENS_KWH", DEFAULT_ENERGY_PER_1K_TOKENS_KWH)?,
            timeout_secs: vars.parsed("PROVIDER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    // Empty values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }
}
