use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use log::{error, info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::json;

use crate::config::GuardrailConfig;
use crate::error::GuardrailError;
use crate::filter::{self, AllowAll, ContentFilter, Verdict};
use crate::web::models::ChatRequest;

/// Shared state of the guardrail service.
pub struct GuardrailState {
    pub config: GuardrailConfig,
    client: Client,
    filter: Box<dyn ContentFilter>,
}

impl GuardrailState {
    pub fn new(config: GuardrailConfig) -> anyhow::Result<Self> {
        Self::with_filter(config, Box::new(AllowAll))
    }

    pub fn with_filter(
        config: GuardrailConfig,
        filter: Box<dyn ContentFilter>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            client,
            filter,
        })
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn sanitize(
    data: web::Data<GuardrailState>,
    req: web::Json<ChatRequest>,
) -> impl Responder {
    let (response, _) = filter::sanitize(data.filter.as_ref(), &req);
    HttpResponse::Ok().json(response)
}

/// Check the request, then relay it to llm-proxy and hand its answer back untouched.
pub async fn chat(
    data: web::Data<GuardrailState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, GuardrailError> {
    let req = req.into_inner();

    let (checked, verdict) = filter::sanitize(data.filter.as_ref(), &req);
    if let Verdict::Unsafe(reason) = verdict {
        warn!("Rejected unsafe message: {}", reason);
        return Err(GuardrailError::UnsafeContent(reason));
    }

    info!(
        "Forwarding {} messages to {} (last user message: {} chars)",
        req.messages.len(),
        data.config.llm_proxy_url,
        checked.last_user_message.chars().count()
    );

    let response = data
        .client
        .post(&data.config.llm_proxy_url)
        .json(&req)
        .send()
        .await
        .map_err(|e| relay_error(e, data.config.timeout_secs))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response
        .bytes()
        .await
        .map_err(|e| relay_error(e, data.config.timeout_secs))?
        .to_vec();

    if !(200..300).contains(&status) {
        error!("llm-proxy returned {}", status);
        return Err(GuardrailError::Upstream {
            status,
            content_type,
            body,
        });
    }

    Ok(HttpResponse::build(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
        .content_type(content_type.as_deref().unwrap_or("application/json"))
        .body(body))
}

fn relay_error(e: reqwest::Error, timeout_secs: u64) -> GuardrailError {
    error!("llm-proxy request failed: {}", e);
    if e.is_timeout() {
        GuardrailError::Timeout(timeout_secs)
    } else {
        GuardrailError::Unreachable(e.to_string())
    }
}
