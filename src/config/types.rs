use serde::Deserialize;

/// Main configuration structure for PR-Harvest
///
/// Every section and key is optional in the TOML file; missing values fall
/// back to the defaults below and command-line flags override both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub github: GitHubConfig,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Identity of the repository whose pull requests are harvested
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Owning user or organization
    pub owner: String,

    /// Repository name
    pub name: String,
}

impl RepositoryConfig {
    /// Returns the `owner/name` slug
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// Base URL of the REST API; the GraphQL endpoint is `<api-url>/graphql`
    pub api_url: String,

    /// Name of the environment variable holding the bearer token
    pub token_env: String,

    /// User agent sent with every request
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            user_agent: concat!("pr-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 60,
        }
    }
}

/// Crawl behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Pull requests requested per enumeration page
    pub page_size: u32,

    /// Number of concurrent diff downloads
    pub diff_concurrency: usize,

    /// Maximum attempts per remote call (first try included)
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,

    /// How many rate-limit windows a single call may wait out
    pub max_rate_limit_waits: u32,

    /// Remaining-call count at or below which the throttle suspends
    pub throttle_threshold: u64,

    /// Extra seconds slept past a quota reset
    pub safety_margin_secs: u64,

    /// Reservations between quota re-syncs
    pub sync_interval: u32,

    /// Maximum number of new pull requests recorded per run
    pub limit: Option<u64>,

    /// Skip the diff phase entirely
    pub skip_diffs: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            diff_concurrency: 5,
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_rate_limit_waits: 10,
            throttle_threshold: 10,
            safety_margin_secs: 5,
            sync_interval: 25,
            limit: None,
            skip_diffs: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for the checkpoint, pull-request records and diffs
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "data/raw-data".to_string(),
        }
    }
}
