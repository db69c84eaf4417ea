//! Configuration management.
//!
//! Settings come from an optional TOML file, then environment variables
//! prefixed with `RESEARCH_AGGREGATOR_` (`__` separates nested keys):
//!
//! ```bash
//! export RESEARCH_AGGREGATOR_SEARCH__STRATEGY=fallback
//! export RESEARCH_AGGREGATOR_SOURCES__ORDER="arxiv,openalex"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{SearchOptions, Strategy};
use crate::sources::{SourceSettings, KNOWN_SOURCES};
use crate::utils::RetryConfig;

/// Prefix of every environment override
pub const ENV_PREFIX: &str = "RESEARCH_AGGREGATOR";

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "research-aggregator.toml";

/// Longest a harvester run may take, whatever the search deadline
const MAX_PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variables understood by the application, with descriptions
pub const ENV_VARS: &[(&str, &str)] = &[
    ("RESEARCH_AGGREGATOR_SEARCH__STRATEGY", "fanout or fallback"),
    ("RESEARCH_AGGREGATOR_SEARCH__DEADLINE_MS", "overall search deadline in milliseconds"),
    ("RESEARCH_AGGREGATOR_SEARCH__DEFAULT_LIMIT", "result count when --limit is not given"),
    ("RESEARCH_AGGREGATOR_SEARCH__MAX_LIMIT", "upper bound for the result count"),
    ("RESEARCH_AGGREGATOR_SEARCH__MIN_QUERY_LEN", "minimum query length in characters"),
    ("RESEARCH_AGGREGATOR_SOURCES__ORDER", "comma-separated provider priority list"),
    ("RESEARCH_AGGREGATOR_SOURCES__OPENALEX_EMAIL", "email for the OpenAlex polite pool"),
    ("RESEARCH_AGGREGATOR_SOURCES__REQUESTS_PER_SECOND", "client-side throttle per provider (0 disables)"),
    ("RESEARCH_AGGREGATOR_TIMEOUTS__CONNECT_MS", "per-attempt connect timeout"),
    ("RESEARCH_AGGREGATOR_TIMEOUTS__READ_MS", "per-attempt read timeout"),
    ("RESEARCH_AGGREGATOR_RETRY__MAX_ATTEMPTS", "attempts per provider call"),
    ("RESEARCH_AGGREGATOR_RETRY__INITIAL_DELAY_MS", "first backoff delay"),
    ("RESEARCH_AGGREGATOR_RETRY__MAX_DELAY_MS", "backoff delay cap"),
    ("RESEARCH_AGGREGATOR_RETRY__BACKOFF_MULTIPLIER", "backoff growth factor"),
    ("RESEARCH_AGGREGATOR_CACHE__ENABLED", "true or false"),
    ("RESEARCH_AGGREGATOR_CACHE__TTL_SECONDS", "cache entry lifetime"),
    ("RESEARCH_AGGREGATOR_LOGGING__LEVEL", "default log level when RUST_LOG is unset"),
    ("RESEARCH_AGGREGATOR_LOGGING__FORMAT", "text or json"),
    ("OPENALEX_EMAIL", "fallback for sources.openalex_email"),
    ("RUST_LOG", "tracing filter directives, overrides logging.level"),
];

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub strategy: Strategy,

    /// Overall deadline for the provider phase of one search
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            deadline_ms: default_deadline_ms(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            min_query_len: default_min_query_len(),
        }
    }
}

fn default_deadline_ms() -> u64 {
    15_000
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    50
}

fn default_min_query_len() -> usize {
    3
}

/// Provider selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Provider ids in priority order
    #[serde(default = "default_order")]
    pub order: Vec<String>,

    /// Polite-pool email for OpenAlex (also sent to CrossRef)
    #[serde(default)]
    pub openalex_email: Option<String>,

    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            openalex_email: None,
            requests_per_second: default_rps(),
        }
    }
}

fn default_order() -> Vec<String> {
    ["openalex", "arxiv", "crossref", "europe_pmc"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_rps() -> u32 {
    5
}

/// Per-attempt network timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    #[serde(default = "default_read_ms")]
    pub read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            read_ms: default_read_ms(),
        }
    }
}

fn default_connect_ms() -> u64 {
    3_000
}

fn default_read_ms() -> u64 {
    6_000
}

/// Retry policy of every adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    300
}

fn default_max_delay_ms() -> u64 {
    4_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    3_600
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging defaults; `RUST_LOG` and CLI flags take precedence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if search.deadline_ms == 0 {
            return Err(ConfigError::Invalid("search.deadline_ms must be positive".into()));
        }
        if search.max_limit == 0 {
            return Err(ConfigError::Invalid("search.max_limit must be at least 1".into()));
        }
        if search.default_limit == 0 || search.default_limit > search.max_limit {
            return Err(ConfigError::Invalid(format!(
                "search.default_limit must be between 1 and {}",
                search.max_limit
            )));
        }

        let attempt_budget = self.timeouts.connect_ms.saturating_add(self.timeouts.read_ms);
        if attempt_budget >= search.deadline_ms {
            return Err(ConfigError::Invalid(format!(
                "timeouts.connect_ms + timeouts.read_ms ({}) must be smaller than search.deadline_ms ({})",
                attempt_budget, search.deadline_ms
            )));
        }

        if self.sources.order.is_empty() {
            return Err(ConfigError::Invalid("sources.order must list at least one provider".into()));
        }
        let mut seen = HashSet::new();
        for id in &self.sources.order {
            if !KNOWN_SOURCES.contains(&id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown source '{}' in sources.order (known: {})",
                    id,
                    KNOWN_SOURCES.join(", ")
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::Invalid(format!("source '{}' is listed twice", id)));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid("retry.backoff_multiplier must be at least 1.0".into()));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::Invalid("cache.ttl_seconds must be positive".into()));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }

    /// Settings handed to every adapter
    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            retry: self.retry_config(),
            requests_per_second: self.sources.requests_per_second,
            openalex_email: self.sources.openalex_email.clone(),
            process_timeout: self.process_timeout(),
        }
    }

    /// Harvester run timeout, kept below the search deadline so the harvester
    /// reports its own timeout before the search gives up on it
    pub fn process_timeout(&self) -> Duration {
        let deadline_ms = self.search.deadline_ms;
        Duration::from_millis(deadline_ms.saturating_sub(deadline_ms / 10)).min(MAX_PROCESS_TIMEOUT)
    }

    /// Orchestrator options
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            strategy: self.search.strategy,
            deadline: Duration::from_millis(self.search.deadline_ms),
            min_query_len: self.search.min_query_len,
            max_limit: self.search.max_limit,
            connect_timeout: Duration::from_millis(self.timeouts.connect_ms),
            read_timeout: Duration::from_millis(self.timeouts.read_ms),
        }
    }
}

/// Locate a config file: `./research-aggregator.toml`, then
/// `<config_dir>/research-aggregator/config.toml`
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("research-aggregator").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Load configuration from an optional file plus `RESEARCH_AGGREGATOR_*` variables
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_from(path, ENV_PREFIX)
}

/// Load configuration with a custom environment prefix
pub fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(true),
        );
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("sources.order")
                .try_parsing(true),
        )
        .build()?;

    let mut config: Config = settings.try_deserialize()?;

    if config.sources.openalex_email.is_none() {
        config.sources.openalex_email = std::env::var("OPENALEX_EMAIL")
            .ok()
            .filter(|email| !email.trim().is_empty());
    }

    config.validate()?;
    Ok(config)
}
