//! Configuration module.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::cache::CacheConfig;

const DEFAULT_DATABASE: &str = "kira";
const DEFAULT_SNAPSHOT_SECS: u64 = 300;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Telegram bot token. Without one the process runs headless.
    pub bot_token: Option<String>,

    /// MongoDB connection string. Without one the stores live in memory only.
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    /// Period of full snapshots of every store. `None` disables them.
    pub snapshot_interval: Option<Duration>,

    /// Bounds of the group metadata cache.
    pub group_cache: CacheConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    ///
    /// Empty values count as unset. Unparseable numbers fall back to their
    /// default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let snapshot_secs = parse_or(get("SNAPSHOT_INTERVAL_SECS"), "SNAPSHOT_INTERVAL_SECS", DEFAULT_SNAPSHOT_SECS);

        let defaults = CacheConfig::group_metadata();
        let capacity = parse_or(get("GROUP_CACHE_CAPACITY"), "GROUP_CACHE_CAPACITY", defaults.max_capacity);
        let ttl_secs = parse_or(
            get("GROUP_CACHE_TTL_SECS"),
            "GROUP_CACHE_TTL_SECS",
            defaults.ttl.map_or(0, |ttl| ttl.as_secs()),
        );

        let group_cache = match ttl_secs {
            0 => CacheConfig::with_capacity(capacity).no_ttl(),
            secs => CacheConfig::with_capacity(capacity).ttl(Duration::from_secs(secs)),
        };

        Self {
            bot_token: get("BOT_TOKEN"),
            mongodb_uri: get("MONGODB_URI"),
            mongodb_database: get("MONGODB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            snapshot_interval: (snapshot_secs > 0).then(|| Duration::from_secs(snapshot_secs)),
            group_cache,
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    raw.parse().unwrap_or_else(|_| {
        warn!("{} has invalid value '{}', using {}", key, raw, default);
        default
    })
}
