//! Server Configuration
//!
//! All settings are fixed before the reactor starts and read-only afterwards.
//! The binary fills a [`Config`] from the command line; library users and
//! tests start from [`Config::default`].

use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default bind address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 7379;

/// Default key-count ceiling
pub const DEFAULT_KEYS_LIMIT: usize = 100;

/// Default fraction of `keys_limit` freed per `allkeys-random` run
pub const DEFAULT_EVICTION_RATIO: f64 = 0.40;

/// Default append-only file location
pub const DEFAULT_AOF_FILE: &str = "./quick-master.aof";

/// Default interval between expiry sweeps, in milliseconds
pub const DEFAULT_CRON_INTERVAL_MS: u64 = 1000;

/// Which keys to drop when the store reaches its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EvictionStrategy {
    /// Delete the first key in iteration order
    #[default]
    #[value(name = "simple-first")]
    SimpleFirst,

    /// Delete `eviction_ratio * keys_limit` keys in unspecified order
    #[value(name = "allkeys-random")]
    AllKeysRandom,
}

impl EvictionStrategy {
    /// The configuration name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::SimpleFirst => "simple-first",
            EvictionStrategy::AllKeysRandom => "allkeys-random",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple-first" => Ok(EvictionStrategy::SimpleFirst),
            "allkeys-random" => Ok(EvictionStrategy::AllKeysRandom),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Errors raised while validating a [`Config`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("keys limit must be positive")]
    ZeroKeysLimit,

    #[error("eviction ratio must be in (0, 1], got {0}")]
    InvalidEvictionRatio(f64),

    #[error("cron interval must be positive")]
    ZeroCronInterval,

    #[error("unknown eviction strategy '{0}'")]
    UnknownStrategy(String),
}

/// Process-wide server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "quickkv", version, about = "A single-threaded in-memory key-value server")]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of keys held before eviction kicks in
    #[arg(long, default_value_t = DEFAULT_KEYS_LIMIT)]
    pub keys_limit: usize,

    /// Eviction strategy
    #[arg(long, value_enum, default_value_t = EvictionStrategy::SimpleFirst)]
    pub eviction_strategy: EvictionStrategy,

    /// Fraction of the keys limit freed by one allkeys-random eviction
    #[arg(long, default_value_t = DEFAULT_EVICTION_RATIO)]
    pub eviction_ratio: f64,

    /// Append-only file written by BGREWRITEAOF and on shutdown
    #[arg(long, default_value = DEFAULT_AOF_FILE)]
    pub aof_file: PathBuf,

    /// Interval between active expiry sweeps, in milliseconds
    #[arg(long, default_value_t = DEFAULT_CRON_INTERVAL_MS)]
    pub cron_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            keys_limit: DEFAULT_KEYS_LIMIT,
            eviction_strategy: EvictionStrategy::default(),
            eviction_ratio: DEFAULT_EVICTION_RATIO,
            aof_file: PathBuf::from(DEFAULT_AOF_FILE),
            cron_interval_ms: DEFAULT_CRON_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keys_limit == 0 {
            return Err(ConfigError::ZeroKeysLimit);
        }
        if !(self.eviction_ratio > 0.0 && self.eviction_ratio <= 1.0) {
            return Err(ConfigError::InvalidEvictionRatio(self.eviction_ratio));
        }
        if self.cron_interval_ms == 0 {
            return Err(ConfigError::ZeroCronInterval);
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cron_interval(&self) -> Duration {
        Duration::from_millis(self.cron_interval_ms)
    }
}
