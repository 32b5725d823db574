use crate::storage::{RawPolicy, RawRetention};
use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Driftnet
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed used when none is given on the command line
    #[serde(default)]
    pub seed: Option<String>,

    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub raw: RawConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// How long a `Running` task is left alone before another run may resume it
    ///
    /// Defaults to the fetcher's request timeout, the longest a live runner
    /// can spend on one fetch.
    pub fn resume_lease(&self) -> Duration {
        seconds(
            self.crawler
                .resume_lease
                .unwrap_or(self.fetcher.request_timeout),
        )
    }
}

/// Scheduling behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Seconds after which a settled task becomes eligible again
    #[serde(rename = "expiration-window")]
    pub expiration_window: u64,

    /// Seconds without an update after which a `Running` task may be resumed
    #[serde(rename = "resume-lease", default)]
    pub resume_lease: Option<u64>,

    /// Upper bound on tasks processed by one invocation
    #[serde(rename = "max-tasks", default)]
    pub max_tasks: Option<u64>,
}

impl CrawlerConfig {
    pub fn expiration_window(&self) -> Duration {
        seconds(self.expiration_window)
    }
}

/// Raw content storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Seconds during which the latest snapshot is overwritten in place
    #[serde(rename = "freshness-window", default = "default_freshness_window")]
    pub freshness_window: u64,

    #[serde(default)]
    pub retention: RawRetention,
}

impl RawConfig {
    pub fn policy(&self) -> RawPolicy {
        RawPolicy {
            freshness_window: seconds(self.freshness_window),
            retention: self.retention,
        }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            freshness_window: default_freshness_window(),
            retention: RawRetention::default(),
        }
    }
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Connection timeout in seconds
    #[serde(rename = "connect-timeout", default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Largest window accepted for any duration setting (100 years)
pub(crate) const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn seconds(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_WINDOW_SECS) as i64)
}

fn default_freshness_window() -> u64 {
    7 * 24 * 60 * 60
}

fn default_user_agent() -> String {
    format!("driftnet/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./driftnet.db")
}
