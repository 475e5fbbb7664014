//! GPTLens Common Library
//!
//! Shared code for the GPTLens services including:
//! - Database models, repository and the in-memory store
//! - Write key and JWT authentication
//! - Per-app rate limiting and identifier hashing
//! - Dashboard report reducers
//! - Ingest, insights and retention services
//! - Error types, configuration, metrics and tracing setup

pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod hashing;
pub mod metrics;
pub mod plans;
pub mod ratelimit;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{AnalyticsStore, MemoryStore, Repository};
pub use errors::{AppError, ErrorCode, Result};
pub use plans::{Feature, Plan};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
