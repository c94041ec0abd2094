use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use llm_guardrail_proxy::config::GuardrailConfig;
use llm_guardrail_proxy::web::guardrail::GuardrailState;
use llm_guardrail_proxy::web::routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match GuardrailConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid guardrail configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting guardrail, forwarding to {}", config.llm_proxy_url);

    let bind = (config.host.clone(), config.port);
    let state = match GuardrailState::new(config) {
        Ok(state) => Data::new(state),
        Err(e) => {
            error!("Failed to initialize HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure_guardrail)
    })
    .bind(bind)?
    .run()
    .await
}
