use crate::config::types::{Config, GitHubConfig, RepositoryConfig};
use crate::config::validation::{validate, validate_repository};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses a configuration file without validating it
///
/// Used when command-line overrides still have to be applied before the
/// configuration can be judged complete (the repository identity, for one,
/// usually comes from `--repo`).
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use pr_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Diff workers: {}", config.crawler.diff_concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = parse_config(path)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so two runs against the same checkpoint can be told
/// apart when their settings differ.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Parses an `owner/name` repository slug
///
/// # Example
///
/// ```
/// use pr_harvest::config::parse_repository;
///
/// let repo = parse_repository("dotnet/runtime").unwrap();
/// assert_eq!(repo.owner, "dotnet");
/// assert_eq!(repo.name, "runtime");
/// ```
pub fn parse_repository(slug: &str) -> Result<RepositoryConfig, ConfigError> {
    let (owner, name) = slug
        .trim()
        .split_once('/')
        .ok_or_else(|| ConfigError::InvalidRepository(slug.to_string()))?;

    let repository = RepositoryConfig {
        owner: owner.to_string(),
        name: name.to_string(),
    };
    validate_repository(&repository)?;
    Ok(repository)
}

/// Reads the bearer token from the environment variable named in the config
///
/// An absent or blank variable is a fatal configuration error, raised before
/// any remote call is made.
pub fn resolve_token(config: &GitHubConfig) -> Result<String, ConfigError> {
    match std::env::var(&config.token_env) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(ConfigError::MissingCredential {
            var: config.token_env.clone(),
        }),
    }
}
