pub mod app_state;
pub mod asset_store;
pub mod auth;
pub mod brand_extractor;
pub mod config;
pub mod credit_ledger;
pub mod entities;
pub mod error;
pub mod gallery;
pub mod generation_store;
pub mod image_generator;
pub mod orchestrator;
pub mod prompt;
pub mod rate_limit;
pub mod routes;
