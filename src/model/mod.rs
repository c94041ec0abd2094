pub mod pricing;
pub mod tokens;

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::{Provider, ProviderSettings, ProxyConfig};
use crate::error::ProviderError;
use crate::web::models::{ChatCompletion, ChatMessage, Choice, CompletionMessage, Role, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Sampling parameters and prompt for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Provider-agnostic chat completion client.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    settings: ProviderSettings,
    client: Client,
    timeout_secs: u64,
}

impl ProviderClient {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        info!(
            "Using provider {} with model {}",
            config.provider.provider(),
            config.provider.model_name()
        );

        Ok(Self {
            settings: config.provider.clone(),
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn provider(&self) -> Provider {
        self.settings.provider()
    }

    pub fn model_name(&self) -> String {
        self.settings.model_name()
    }

    pub async fn complete(&self, req: &CompletionRequest<'_>) -> Result<ChatCompletion, ProviderError> {
        debug!(
            "Sending {} messages to {} (max_tokens: {}, temperature: {})",
            req.messages.len(),
            self.provider(),
            req.max_tokens,
            req.temperature
        );

        match &self.settings {
            ProviderSettings::Azure {
                endpoint,
                api_key,
                deployment,
                api_version,
            } => {
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions",
                    endpoint.trim_end_matches('/'),
                    deployment
                );
                let request = self
                    .client
                    .post(url)
                    .query(&[("api-version", api_version.as_str())])
                    .header("api-key", api_key)
                    .json(&json!({
                        "messages": req.messages,
                        "max_tokens": req.max_tokens,
                        "temperature": req.temperature,
                    }));
                let response = self.send(request).await?;
                self.decode(response).await
            }
            ProviderSettings::OpenAi {
                api_base,
                api_key,
                model,
            } => {
                let url = format!("{}/chat/completions", api_base.trim_end_matches('/'));
                let request = self.client.post(url).bearer_auth(api_key).json(&json!({
                    "model": model,
                    "messages": req.messages,
                    "max_tokens": req.max_tokens,
                    "temperature": req.temperature,
                }));
                let response = self.send(request).await?;
                self.decode(response).await
            }
            ProviderSettings::Anthropic {
                api_base,
                api_key,
                model,
            } => {
                let url = format!("{}/messages", api_base.trim_end_matches('/'));
                let request = self
                    .client
                    .post(url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&anthropic_body(model, req));
                let response = self.send(request).await?;
                let message: AnthropicMessage = self.decode(response).await?;
                Ok(message.into())
            }
        }
    }

    /// Send the request and classify transport failures and non-2xx statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let message = error_message(&response.text().await.unwrap_or_default());

        Err(match status.as_u16() {
            401 | 403 => ProviderError::Auth {
                status: status.as_u16(),
                message,
            },
            429 => ProviderError::RateLimited { retry_after_secs },
            code => ProviderError::Upstream {
                status: code,
                message,
            },
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ProviderError> {
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Pull `error.message` out of an OpenAI/Anthropic error body, else use the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn anthropic_body(model: &str, req: &CompletionRequest<'_>) -> Value {
    let system: Vec<&str> = req
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let messages: Vec<&ChatMessage> = req
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "temperature": req.temperature,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    id: String,
    model: String,
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<AnthropicMessage> for ChatCompletion {
    fn from(message: AnthropicMessage) -> Self {
        let text: String = message
            .content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_deref())
            .collect();
        ChatCompletion {
            id: message.id,
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model: message.model,
            choices: vec![Choice {
                index: 0,
                message: CompletionMessage {
                    role: "assistant".to_string(),
                    content: Some(text),
                    extra: Map::new(),
                },
                finish_reason: message.stop_reason,
                extra: Map::new(),
            }],
            usage: Usage {
                prompt_tokens: message.usage.input_tokens,
                completion_tokens: message.usage.output_tokens,
                total_tokens: message.usage.input_tokens + message.usage.output_tokens,
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(pairs: &[(&str, &str)]) -> ProxyConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProxyConfig::from_lookup(move |key| map.get(key).cloned()).unwrap()
    }

    fn azure_completion() -> Value {
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        })
    }

    #[tokio::test]
    async fn azure_request_uses_deployment_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(query_param("api-version", "2024-08-01-preview"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(azure_completion()))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let client = ProviderClient::new(&config(&[
            ("AZURE_OPENAI_ENDPOINT", uri.as_str()),
            ("AZURE_OPENAI_API_KEY", "secret"),
        ]))
        .unwrap();
        let messages = vec![ChatMessage::user("hi")];
        let completion = client
            .complete(&CompletionRequest {
                messages: &messages,
                max_tokens: 16,
                temperature: 0.2,
            })
            .await
            .unwrap();

        assert_eq!(completion.text(), Some("Hello!"));
        assert_eq!(completion.usage.total_tokens, 12);
    }

    #[tokio::test]
    async fn statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"error": {"message": "Access denied"}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let client = ProviderClient::new(&config(&[
            ("LLM_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_API_BASE", uri.as_str()),
        ]))
        .unwrap();
        let messages = vec![ChatMessage::user("hi")];
        let req = CompletionRequest {
            messages: &messages,
            max_tokens: 16,
            temperature: 0.7,
        };

        let err = client.complete(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth { status: 401, ref message } if message == "Access denied"));

        let err = client.complete(&req).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: Some(7) }));

        let err = client.complete(&req).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[tokio::test]
    async fn openai_request_carries_exact_sampling_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 16,
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(azure_completion()))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let client = ProviderClient::new(&config(&[
            ("LLM_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_API_BASE", uri.as_str()),
            ("LLM_MODEL", "gpt-4o"),
        ]))
        .unwrap();
        let messages = vec![ChatMessage::user("hi")];
        client
            .complete(&CompletionRequest {
                messages: &messages,
                max_tokens: 16,
                temperature: 0.7,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn slow_provider_is_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(azure_completion())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let client = ProviderClient::new(&config(&[
            ("AZURE_OPENAI_ENDPOINT", uri.as_str()),
            ("AZURE_OPENAI_API_KEY", "secret"),
            ("PROVIDER_TIMEOUT_SECS", "1"),
        ]))
        .unwrap();
        let messages = vec![ChatMessage::user("hi")];
        let err = client
            .complete(&CompletionRequest {
                messages: &messages,
                max_tokens: 16,
                temperature: 0.7,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.to_string(), "provider request timed out after 1s");
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let client = ProviderClient::new(&config(&[
            ("AZURE_OPENAI_ENDPOINT", "http://127.0.0.1:9"),
            ("AZURE_OPENAI_API_KEY", "secret"),
        ]))
        .unwrap();
        let messages = vec![ChatMessage::user("hi")];
        let err = client
            .complete(&CompletionRequest {
                messages: &messages,
                max_tokens: 16,
                temperature: 0.7,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn anthropic_response_is_translated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "ak-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-haiku-20240307",
                "content": [{"type": "text", "text": "Bonjour"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let client = ProviderClient::new(&config(&[
            ("LLM_PROVIDER", "anthropic"),
            ("ANTHROPIC_API_KEY", "ak-test"),
            ("ANTHROPIC_API_BASE", uri.as_str()),
        ]))
        .unwrap();
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: "Answer in French".into(),
            },
            ChatMessage::user("Hello"),
        ];
        let completion = client
            .complete(&CompletionRequest {
                messages: &messages,
                max_tokens: 64,
                temperature: 0.7,
            })
            .await
            .unwrap();

        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.text(), Some("Bonjour"));
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(completion.usage.total_tokens, 14);
    }

    #[test]
    fn anthropic_body_lifts_system_messages() {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: "be brief".into(),
            },
            ChatMessage::user("hi"),
        ];
        let body = anthropic_body(
            "claude-3-haiku-20240307",
            &CompletionRequest {
                messages: &messages,
                max_tokens: 10,
                temperature: 0.5,
            },
        );
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
