//! # Integrations API Library
//!
//! This library provides the core functionality for the Integrations API
//! service: API key issuance and validation, the OAuth2 authorization-code
//! and token lifecycle, and the webhook delivery engine with retry/backoff.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod repositories;
pub mod server;
pub mod services;
pub mod telemetry;
pub use migration;
