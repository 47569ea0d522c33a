//! Configuration module for PR-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! plus resolving the bearer token from the environment.
//!
//! # Example
//!
//! ```no_run
//! use pr_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting {}", config.repository.slug());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, GitHubConfig, OutputConfig, RepositoryConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, parse_config, parse_repository, resolve_token,
};
pub use validation::validate;
