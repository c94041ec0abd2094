use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use llm_guardrail_proxy::config::ProxyConfig;
use llm_guardrail_proxy::web::proxy::ProxyState;
use llm_guardrail_proxy::web::routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Missing credentials are fatal: the process never binds its port.
    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("LLM-Proxy cannot start: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "LLM-Proxy starting (provider: {}, model: {}, timeout: {}s)",
        config.provider.provider(),
        config.provider.model_name(),
        config.timeout_secs
    );

    let bind = (config.host.clone(), config.port);
    let state = match ProxyState::new(config) {
        Ok(state) => Data::new(state),
        Err(e) => {
            error!("Failed to initialize provider client: {}", e);
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure_proxy)
    })
    .bind(bind)?
    .run()
    .await
}
