//! PR-Harvest: a resumable pull-request history crawler
//!
//! This crate extracts the complete pull-request history of one hosted repository
//! (metadata, comments, review threads, commits and per-commit diffs) while
//! staying inside the host's hourly API budget and surviving crashes, transient
//! failures and quota exhaustion without losing completed work.

pub mod config;
pub mod crawler;
pub mod github;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for PR-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Failed to enumerate pull requests: {0}")]
    Enumeration(#[source] crawler::PaginationError),

    #[error("Credential rejected by the API: {0}")]
    Unauthorized(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid repository identity '{0}' (expected owner/name)")]
    InvalidRepository(String),

    #[error("Missing credential: environment variable {var} is not set")]
    MissingCredential { var: String },
}

/// Result type alias for PR-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlReport};
pub use github::GitHubClient;
pub use state::{CrawlState, ItemState};
