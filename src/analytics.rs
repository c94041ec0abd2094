use chrono::{SecondsFormat, Utc};
use log::{error, info};
use serde::Serialize;

/// Log target carrying one JSON record per proxied request.
pub const METRICS_TARGET: &str = "llm_metrics";

/// Estimated energy use in kWh. This is a configured approximation, not a measurement.
pub fn energy_kwh(total_tokens: u32, energy_per_1k_tokens_kwh: f64) -> f64 {
    (total_tokens as f64 / 1000.0) * energy_per_1k_tokens_kwh
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsRecord {
    pub event: &'static str,
    pub request_id: String,
    pub model: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
    pub processing_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_consumption_kwh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timestamp: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Identity and sampling settings of one proxied request.
#[derive(Debug, Clone, Copy)]
pub struct RequestMeta<'a> {
    pub request_id: &'a str,
    pub model: &'a str,
    pub provider: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl MetricsRecord {
    /// Record skeleton for a request; the outcome fields are filled in by the caller.
    pub fn new(
        event: &'static str,
        meta: &RequestMeta<'_>,
        processing_time_seconds: f64,
        status: Status,
    ) -> Self {
        Self {
            event,
            request_id: meta.request_id.to_string(),
            model: meta.model.to_string(),
            provider: meta.provider.to_string(),
            input_tokens: None,
            output_tokens: None,
            total_tokens: None,
            processing_time_seconds: round_to(processing_time_seconds, 3),
            energy_consumption_kwh: None,
            cost_usd: None,
            temperature: meta.temperature,
            max_tokens: meta.max_tokens,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status,
            error_kind: None,
            error: None,
        }
    }

    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(line) => info!(target: METRICS_TARGET, "{}", line),
            Err(e) => error!(target: METRICS_TARGET, "failed to encode metrics record: {}", e),
        }
    }
}
