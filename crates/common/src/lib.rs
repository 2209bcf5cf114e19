//! Citator Common Library
//!
//! Shared code for the citation worker and the batch CLI including:
//! - Database models and repository patterns
//! - Error types and handling
//! - Configuration management
//! - SQS job transport
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod observability;
pub mod queue;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, OpinionSelection, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
