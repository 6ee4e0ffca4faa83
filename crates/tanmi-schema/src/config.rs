use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Current schema version of `config.json`, bumped on any breaking shape
/// change so `Config::load` can migrate forward.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Which store entries a `clean` run is allowed to evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanStrategy {
    /// Evict any entry with no referencing project.
    Unreferenced,
    /// Evict unreferenced entries past `unused_days` since unlink.
    Unused,
    /// Evict unreferenced entries down to `max_store_size`.
    Capacity,
    /// Never evict automatically; the operator drives eviction explicitly.
    Manual,
}

/// How to handle a local directory with no store record during `link`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnverifiedLocalStrategy {
    /// Discard local content and download fresh from the declared commit.
    Download,
    /// Absorb the local content into the store as-is.
    Absorb,
}

/// Verbosity level for the external-facing CLI logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-operation tracing detail.
    Debug,
    /// Slightly quieter than `Debug`, still noisy.
    Verbose,
    /// One line per completed dependency/action.
    Info,
    /// Recoverable problems only.
    Warn,
    /// Failures only.
    Error,
}

/// Proxy settings forwarded to the external fetcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// `http_proxy` override, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    /// `https_proxy` override, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<String>,
}

/// The store root's `config.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version, for forward migration.
    pub version: u32,
    /// Whether `init` has been run against this config directory.
    #[serde(default)]
    pub initialized: bool,
    /// Absolute path to the content store root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    /// Default eviction strategy for `clean` when none is given explicitly.
    pub clean_strategy: CleanStrategy,
    /// Age threshold, in days, for `CleanStrategy::Unused`.
    pub unused_days: u32,
    /// Byte count of unreferenced store content at which `CleanStrategy::Capacity` triggers.
    pub unreferenced_threshold: u64,
    /// Soft cap on total store size in bytes for `CleanStrategy::Capacity`.
    pub max_store_size: u64,
    /// Whether `link` is allowed to invoke the external fetcher at all.
    pub auto_download: bool,
    /// Bounded download concurrency; see [`VALID_CONCURRENCY_VALUES`].
    pub concurrency: u32,
    /// Verbosity forwarded to the CLI's `tracing` subscriber.
    pub log_level: LogLevel,
    /// Proxy settings forwarded to the external fetcher.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// How to treat a local directory the store has no record of.
    pub unverified_local_strategy: UnverifiedLocalStrategy,
}

/// The closed set of valid `concurrency` values; `99` denotes unbounded.
pub const VALID_CONCURRENCY_VALUES: &[u32] = &[1, 2, 3, 5, 99];

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_SCHEMA_VERSION,
            initialized: false,
            store_path: None,
            clean_strategy: CleanStrategy::Unreferenced,
            unused_days: 30,
            unreferenced_threshold: 0,
            max_store_size: 0,
            auto_download: true,
            concurrency: 3,
            log_level: LogLevel::Info,
            proxy: ProxyConfig::default(),
            unverified_local_strategy: UnverifiedLocalStrategy::Absorb,
        }
    }
}

impl Config {
    /// Validate the closed-set fields that `serde` alone can't enforce.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !VALID_CONCURRENCY_VALUES.contains(&self.concurrency) {
            return Err(CoreError::InputError(format!(
                "invalid concurrency {}; must be one of {VALID_CONCURRENCY_VALUES:?}",
                self.concurrency
            )));
        }
        Ok(())
    }

    /// `concurrency == 99` denotes an unbounded download limiter.
    pub fn download_concurrency(&self) -> Option<usize> {
        if self.concurrency == 99 {
            None
        } else {
            Some(self.concurrency as usize)
        }
    }
}
