//! ThesisForge Common Library
//!
//! Shared code for the ThesisForge services including:
//! - Database models and the research store
//! - Paper search and language model clients
//! - The chapter generation pipeline
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod llm;
pub mod metrics;
pub mod sources;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{DbPool, Repository, ResearchStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
