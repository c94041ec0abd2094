use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Startup configuration problems. Both binaries refuse to bind on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("environment variable {key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("unsupported LLM_PROVIDER {0:?} (expected azure, openai or anthropic)")]
    UnsupportedProvider(String),
}

/// Everything that can go wrong talking to the upstream provider.
///
/// The variants stay distinct in logs and metrics; callers of the proxy only
/// ever see a single generic failure (see [`ProxyError`]).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("provider rejected credentials ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("provider rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Short stable label used in metrics records.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Auth { .. } => "auth",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Upstream { .. } => "upstream",
            ProviderError::Transport(_) => "transport",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Client-facing error of the llm-proxy `/chat` endpoint.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("LLM request failed: {0}")]
    Completion(#[from] ProviderError),
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}

/// Client-facing error of the guardrail `/chat` endpoint.
#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("Unsafe messages detected")]
    UnsafeContent(String),

    /// Downstream answered with a non-2xx status; status, content type and body are relayed verbatim.
    #[error("llm-proxy returned {status}")]
    Upstream {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },

    #[error("llm-proxy unreachable: {0}")]
    Unreachable(String),

    #[error("llm-proxy did not answer within {0}s")]
    Timeout(u64),
}

impl ResponseError for GuardrailError {
    fn status_code(&self) -> StatusCode {
        match self {
            GuardrailError::UnsafeContent(_) => StatusCode::BAD_REQUEST,
            GuardrailError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GuardrailError::Unreachable(_) => StatusCode::BAD_GATEWAY,
            GuardrailError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            GuardrailError::Upstream {
                content_type, body, ..
            } => {
                let mut response = HttpResponse::build(self.status_code());
                if let Some(content_type) = content_type {
                    response.content_type(content_type.as_str());
                }
                response.body(body.clone())
            }
            _ => HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_error_is_generic_500_with_provider_text() {
        let err = ProxyError::from(ProviderError::Auth {
            status: 401,
            message: "bad key".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "LLM request failed: provider rejected credentials (401): bad key"
        );
    }

    #[test]
    fn guardrail_upstream_keeps_status() {
        let err = GuardrailError::Upstream {
            status: 503,
            content_type: Some("application/json".into()),
            body: b"{}".to_vec(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            GuardrailError::UnsafeContent("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GuardrailError::Timeout(60).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn guardrail_upstream_relays_content_type() {
        let html = GuardrailError::Upstream {
            status: 502,
            content_type: Some("text/html; charset=utf-8".into()),
            body: b"<html>bad gateway</html>".to_vec(),
        }
        .error_response();
        assert_eq!(html.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            html.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );

        let bare = GuardrailError::Upstream {
            status: 500,
            content_type: None,
            body: b"oops".to_vec(),
        }
        .error_response();
        assert!(bare.headers().get("content-type").is_none());
    }

    #[test]
    fn provider_error_kinds() {
        assert_eq!(ProviderError::Timeout { timeout_secs: 1 }.kind(), "timeout");
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: None }.kind(),
            "rate_limited"
        );
        assert_eq!(
            ProviderError::MalformedResponse("x".into()).kind(),
            "malformed_response"
        );
    }
}
