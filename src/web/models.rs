use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Canonical chat request understood by both services.
///
/// Deserialization also accepts the legacy `{"prompt": "..."}` body, which is
/// turned into a single user message with default sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Deserialize)]
struct StructuredChatRequest {
    messages: Vec<ChatMessage>,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_temperature")]
    temperature: f64,
}

#[derive(Deserialize)]
struct LegacyChatRequest {
    prompt: String,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

// A body is legacy only when it carries `prompt` and no `messages`; everything
// else is parsed as the structured form so field errors reach the caller.
impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.get("prompt").is_some() && value.get("messages").is_none() {
            let legacy: LegacyChatRequest =
                serde_json::from_value(value).map_err(de::Error::custom)?;
            return Ok(ChatRequest::new(vec![ChatMessage::user(legacy.prompt)]));
        }

        let structured: StructuredChatRequest =
            serde_json::from_value(value).map_err(de::Error::custom)?;
        Ok(ChatRequest {
            messages: structured.messages,
            max_tokens: structured.max_tokens,
            temperature: structured.temperature,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SanitizeResponse {
    pub messages: Vec<ChatMessage>,
    pub safe: bool,
    pub last_user_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: Option<String>,
    /// Provider fields without a typed counterpart (`tool_calls`, ...), relayed as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: CompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Provider response in the OpenAI chat-completion shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    /// e.g. `system_fingerprint` or Azure's `prompt_filter_results`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletion {
    /// Text of the first choice, if the provider produced any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub request_id: String,
    pub processing_time_seconds: f64,
    pub energy_consumption_kwh: f64,
    pub cost_usd: f64,
    pub provider: String,
}

/// Body returned by llm-proxy `/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub completion: ChatCompletion,
    pub analytics: Analytics,
}
