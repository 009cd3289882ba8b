use std::time::Duration;

use redis::IntoConnectionInfo;
use serde::{Deserialize, Serialize};

use crate::{error::Result, keys::DEFAULT_PREFIX, schedule::parse_duration};

const ENV_REDIS_URL: &str = "BOSSBAT_REDIS_URL";
const ENV_REDIS_DB: &str = "BOSSBAT_REDIS_DB";
const ENV_PREFIX: &str = "BOSSBAT_PREFIX";
const ENV_LOCK_TTL: &str = "BOSSBAT_LOCK_TTL";
const ENV_TZ: &str = "BOSSBAT_TZ";
const ENV_DISABLE_REDIS_CONFIG: &str = "BOSSBAT_DISABLE_REDIS_CONFIG";

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Jobs time out their lock after 2 seconds unless configured otherwise.
pub const DEFAULT_LOCK_TTL_MS: u64 = 2000;

/// Where the shared store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Overrides the database index from the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<i64>,
}

fn default_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            db: None,
        }
    }
}

impl ConnectionConfig {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            db: None,
        }
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = Some(db);
        self
    }

    pub fn connection_info(&self) -> Result<redis::ConnectionInfo> {
        let mut info = self.url.as_str().into_connection_info()?;
        if let Some(db) = self.db {
            info.redis.db = db;
        }
        Ok(info)
    }

    /// Database index whose expiry events are subscribed to.
    pub fn database(&self) -> Result<i64> {
        Ok(self.connection_info()?.redis.db)
    }
}

/// Worker options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BossbatConfig {
    pub connection: ConnectionConfig,
    /// Namespace for every key this worker touches.
    pub prefix: String,
    /// Lock duration in milliseconds.
    pub ttl: u64,
    /// IANA timezone for cron evaluation; UTC when unset.
    pub tz: Option<String>,
    /// Leave `notify-keyspace-events` alone, for servers where it is managed externally.
    pub disable_redis_config: bool,
}

impl Default for BossbatConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            prefix: DEFAULT_PREFIX.to_string(),
            ttl: DEFAULT_LOCK_TTL_MS,
            tz: None,
            disable_redis_config: false,
        }
    }
}

impl BossbatConfig {
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl = ttl_ms;
        self
    }

    pub fn with_tz(mut self, tz: impl Into<String>) -> Self {
        self.tz = Some(tz.into());
        self
    }

    pub fn with_redis_config_disabled(mut self) -> Self {
        self.disable_redis_config = true;
        self
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }

    /// Build config from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Build config from any variable lookup.
    ///
    /// - `BOSSBAT_REDIS_URL`: store URL (default `redis://127.0.0.1:6379`)
    /// - `BOSSBAT_REDIS_DB`: database index, overriding the URL
    /// - `BOSSBAT_PREFIX`: key namespace (default `bossbat`)
    /// - `BOSSBAT_LOCK_TTL`: milliseconds or a human duration (default 2000)
    /// - `BOSSBAT_TZ`: cron timezone
    /// - `BOSSBAT_DISABLE_REDIS_CONFIG`: `1`, `true` or `yes`
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = var(ENV_REDIS_URL) {
            config.connection.url = url;
        }
        if let Some(raw) = var(ENV_REDIS_DB) {
            match raw.parse::<i64>() {
                Ok(db) => config.connection.db = Some(db),
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring invalid {ENV_REDIS_DB}"),
            }
        }
        if let Some(prefix) = var(ENV_PREFIX) {
            config.prefix = prefix;
        }
        if let Some(raw) = var(ENV_LOCK_TTL) {
            match raw.parse::<u64>().map_err(|e| e.to_string()).or_else(|_| {
                parse_duration(&raw).map_err(|e| e.to_string())
            }) {
                Ok(ttl) if ttl > 0 => config.ttl = ttl,
                Ok(_) => tracing::warn!(value = %raw, "Ignoring zero {ENV_LOCK_TTL}"),
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring invalid {ENV_LOCK_TTL}"),
            }
        }
        config.tz = var(ENV_TZ);
        if let Some(raw) = var(ENV_DISABLE_REDIS_CONFIG) {
            config.disable_redis_config =
                matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        config
    }
}
