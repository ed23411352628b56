//! Per-cluster settings.
//!
//! Every monitored cluster is configured through environment variables named
//! after the cluster, e.g. for a cluster called `eu-west`:
//!
//! ```text
//! LAGWATCH_EU_WEST_BROKERS=kafka-1:9092,kafka-2:9092
//! LAGWATCH_EU_WEST_META_REFRESH=3m
//! LAGWATCH_EU_WEST_OFFSET_REFRESH=30s
//! ```

use std::time::Duration;

use thiserror::Error;

/// How often group membership and brokers are refreshed by default.
pub const DEFAULT_META_REFRESH: Duration = Duration::from_secs(180);

/// How often high-water marks and committed offsets are refreshed by default.
pub const DEFAULT_OFFSET_REFRESH: Duration = Duration::from_secs(30);

const ENV_PREFIX: &str = "LAGWATCH";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("No brokers configured for cluster {cluster}, set {key}")]
    MissingBrokers { cluster: String, key: String },

    #[error("Invalid duration {value:?} in {key}: {source}")]
    InvalidDuration {
        key: String,
        value: String,
        source: humantime::DurationError,
    },

    #[error("{key} must not be zero")]
    ZeroInterval { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Name the cluster is exposed under.
    pub name: String,

    /// Seed brokers as `host:port`.
    pub brokers: Vec<String>,

    /// Interval between metadata refreshes.
    pub meta_refresh: Duration,

    /// Interval between offset refreshes.
    pub offset_refresh: Duration,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>, brokers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            brokers,
            meta_refresh: DEFAULT_META_REFRESH,
            offset_refresh: DEFAULT_OFFSET_REFRESH,
        }
    }

    /// Reads the settings of cluster `name` from the process environment.
    pub fn from_env(name: &str) -> Result<Self, Error> {
        Self::from_lookup(name, |key| std::env::var(key).ok())
    }

    /// Reads the settings of cluster `name` through `lookup`.
    pub fn from_lookup<F>(name: &str, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = env_key(name, "BROKERS");
        let brokers: Vec<String> = lookup(&key)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
        if brokers.is_empty() {
            return Err(Error::MissingBrokers {
                cluster: name.to_string(),
                key,
            });
        }

        let meta_refresh = interval(&lookup, env_key(name, "META_REFRESH"), DEFAULT_META_REFRESH)?;
        let offset_refresh = interval(
            &lookup,
            env_key(name, "OFFSET_REFRESH"),
            DEFAULT_OFFSET_REFRESH,
        )?;

        Ok(Self {
            name: name.to_string(),
            brokers,
            meta_refresh,
            offset_refresh,
        })
    }
}

/// Environment variable holding `setting` of cluster `name`.
pub fn env_key(name: &str, setting: &str) -> String {
    format!(
        "{ENV_PREFIX}_{}_{setting}",
        name.to_uppercase().replace('-', "_")
    )
}

fn interval<F>(lookup: &F, key: String, default: Duration) -> Result<Duration, Error>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(&key) else {
        return Ok(default);
    };

    let duration = match humantime::parse_duration(value.trim()) {
        Ok(d) => d,
        Err(source) => {
            return Err(Error::InvalidDuration { key, value, source });
        }
    };

    if duration.is_zero() {
        return Err(Error::ZeroInterval { key });
    }

    Ok(duration)
}
