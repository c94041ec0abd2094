pub mod guardrail;
pub mod models;
pub mod proxy;
pub mod routes;
