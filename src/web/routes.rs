use actix_web::web;
use crate::web::{guardrail, proxy};

// Above actix's 32 KiB default; the gateway enforces the real size limit.
const MAX_JSON_BYTES: usize = 1024 * 1024;

pub fn configure_guardrail(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(MAX_JSON_BYTES))
        .route("/healthz", web::get().to(guardrail::health_check))
        .route("/sanitize", web::post().to(guardrail::sanitize))
        .route("/chat", web::post().to(guardrail::chat));
}

pub fn configure_proxy(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(MAX_JSON_BYTES))
        .route("/healthz", web::get().to(proxy::health_check))
        .route("/providers", web::get().to(proxy::providers))
        .route("/chat", web::post().to(proxy::chat));
}
