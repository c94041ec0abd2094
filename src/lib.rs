//! Guardrail and llm-proxy HTTP services.
//!
//! The guardrail checks the last user message and relays chat requests to
//! llm-proxy, which calls the configured LLM provider and attaches token,
//! cost and energy analytics to the response.

pub mod analytics;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod web;
