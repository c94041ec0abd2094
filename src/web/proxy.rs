use std::time::Instant;

use actix_web::{web, HttpResponse, Responder};
use log::{error, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::analytics::{energy_kwh, round_to, MetricsRecord, RequestMeta, Status};
use crate::config::{ProviderSettings, ProxyConfig};
use crate::error::{ProviderError, ProxyError};
use crate::model::{pricing, tokens, CompletionRequest, ProviderClient};
use crate::web::models::{Analytics, ChatRequest, ChatResponse};

/// Shared state of the llm-proxy service.
pub struct ProxyState {
    pub config: ProxyConfig,
    pub provider: ProviderClient,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, ProviderError> {
        let provider = ProviderClient::new(&config)?;
        Ok(Self { config, provider })
    }
}

pub async fn health_check(data: web::Data<ProxyState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "provider": data.provider.provider().as_str(),
        "model": data.provider.model_name(),
    }))
}

/// Supported providers and the active configuration.
pub async fn providers(data: web::Data<ProxyState>) -> impl Responder {
    let (azure_endpoint, azure_deployment) = match &data.config.provider {
        ProviderSettings::Azure {
            endpoint,
            deployment,
            ..
        } => (Some(endpoint.as_str()), Some(deployment.as_str())),
        _ => (None, None),
    };

    HttpResponse::Ok().json(json!({
        "current_provider": data.provider.provider().as_str(),
        "current_model": data.provider.model_name(),
        "supported_providers": {
            "azure": {
                "description": "Azure OpenAI Service",
                "models": ["gpt-4o", "gpt-4", "gpt-35-turbo"],
                "required_env_vars": ["AZURE_OPENAI_ENDPOINT", "AZURE_OPENAI_API_KEY"]
            },
            "openai": {
                "description": "OpenAI API",
                "models": ["gpt-4", "gpt-3.5-turbo", "gpt-4-turbo"],
                "required_env_vars": ["OPENAI_API_KEY"]
            },
            "anthropic": {
                "description": "Anthropic Claude",
                "models": ["claude-3-opus", "claude-3-sonnet", "claude-3-haiku"],
                "required_env_vars": ["ANTHROPIC_API_KEY"]
            }
        },
        "configuration": {
            "azure_endpoint": azure_endpoint,
            "azure_deployment": azure_deployment
        }
    }))
}

pub async fn chat(
    data: web::Data<ProxyState>,
    req: web::Json<ChatRequest>,
) -> Result<HttpResponse, ProxyError> {
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();
    let model = data.provider.model_name();
    let provider = data.provider.provider().as_str();

    info!(
        "LLM request started (request_id: {}, model: {}, max_tokens: {}, temperature: {}, message_count: {})",
        request_id,
        model,
        req.max_tokens,
        req.temperature,
        req.messages.len()
    );

    let meta = RequestMeta {
        request_id: &request_id,
        model: &model,
        provider,
        temperature: req.temperature,
        max_tokens: req.max_tokens,
    };
    let input_tokens = tokens::input_tokens(&request_id, &model, &req.messages);
    let completion = data
        .provider
        .complete(&CompletionRequest {
            messages: &req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        })
        .await
        .and_then(|completion| {
            if completion.choices.is_empty() {
                return Err(ProviderError::MalformedResponse(
                    "response has no choices".to_string(),
                ));
            }
            info!(
                "Response length: {} characters",
                completion.text().unwrap_or_default().len()
            );
            Ok(completion)
        });

    let elapsed = start.elapsed().as_secs_f64();
    let completion = match completion {
        Ok(completion) => completion,
        Err(e) => {
            error!(
                "LLM request failed (request_id: {}, kind: {}, error: {}, processing_time: {:.3})",
                request_id,
                e.kind(),
                e,
                elapsed
            );
            let mut record = MetricsRecord::new("llm_request_failed", &meta, elapsed, Status::Error);
            record.input_tokens = Some(input_tokens);
            record.error_kind = Some(e.kind());
            record.error = Some(e.to_string());
            record.emit();
            return Err(ProxyError::from(e));
        }
    };

    let usage = &completion.usage;
    let cost = pricing::completion_cost(&completion.model, usage)
        .or_else(|| pricing::completion_cost(&model, usage))
        .unwrap_or_else(|| {
            warn!("No price known for model {}, reporting zero cost", completion.model);
            0.0
        });
    let energy = energy_kwh(usage.total_tokens, data.config.energy_per_1k_tokens_kwh);

    let mut record = MetricsRecord::new("llm_request_completed", &meta, elapsed, Status::Success);
    record.input_tokens = Some(input_tokens);
    record.output_tokens = Some(usage.completion_tokens);
    record.total_tokens = Some(usage.total_tokens);
    record.energy_consumption_kwh = Some(round_to(energy, 6));
    record.cost_usd = Some(round_to(cost, 4));
    record.emit();

    info!(
        "LLM request completed successfully (request_id: {}, processing_time: {:.3}, total_tokens: {}, cost: {:.4}, energy_kwh: {:.6})",
        request_id, elapsed, usage.total_tokens, cost, energy
    );

    Ok(HttpResponse::Ok().json(ChatResponse {
        completion,
        analytics: Analytics {
            request_id,
            processing_time_seconds: round_to(elapsed, 3),
            energy_consumption_kwh: round_to(energy, 6),
            cost_usd: round_to(cost, 4),
            provider: provider.to_string(),
        },
    }))
}
