use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use redis::IntoConnectionInfo;

use crate::error::ConfigError;

/// Number of logical databases a stock Redis server exposes.
pub const REDIS_DATABASE_COUNT: i64 = 16;

const DEFAULT_EXPIRATION_SECS: u64 = 24 * 60 * 60;

/// Deadline used when the configured timeout is zero, matching the Redis
/// client default of three seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// Connection settings for the Redis backend.
///
/// An empty `endpoint` turns storage off: construction still succeeds and
/// every write becomes a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub endpoint: String,
    pub database: i64,
    pub timeout_seconds: u64,
    pub password: String,
}

impl RedisConfig {
    pub fn is_disabled(&self) -> bool {
        self.endpoint.is_empty()
    }

    /// Timeout applied to every operation. Zero selects the default
    /// deadline; an operation is never left unbounded.
    pub fn timeout(&self) -> Duration {
        match self.timeout_seconds {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_disabled() {
            return Ok(());
        }

        if !(0..REDIS_DATABASE_COUNT).contains(&self.database) {
            return Err(ConfigError::DatabaseIndexOutOfRange(self.database));
        }

        self.connection_info().map(|_| ())
    }

    /// Resolves the endpoint (`host:port` or a `redis://` URL) into the
    /// connection info handed to the client, with database and password
    /// applied on top.
    pub fn connection_info(&self) -> Result<redis::ConnectionInfo, ConfigError> {
        let url = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("redis://{}", self.endpoint)
        };

        let mut info = url
            .as_str()
            .into_connection_info()
            .map_err(|source| ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                source,
            })?;

        info.redis.db = self.database;
        if !self.password.is_empty() {
            info.redis.password = Some(self.password.clone());
        }

        Ok(info)
    }
}

/// Storage settings: where to connect and how long entries live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub redis: RedisConfig,
    pub expiration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub storage: StorageConfig,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr: SocketAddr = lookup("AGGREGATOR_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("invalid AGGREGATOR_ADDR")?;

        let redis = RedisConfig {
            endpoint: lookup("AGGREGATOR_REDIS_ENDPOINT").unwrap_or_default(),
            database: parse_number(&lookup, "AGGREGATOR_REDIS_DATABASE", 0)?,
            timeout_seconds: parse_number(&lookup, "AGGREGATOR_REDIS_TIMEOUT_SECONDS", 30)?,
            password: lookup("AGGREGATOR_REDIS_PASSWORD").unwrap_or_default(),
        };

        let expiration = Duration::from_secs(parse_number(
            &lookup,
            "AGGREGATOR_REDIS_EXPIRATION_SECONDS",
            DEFAULT_EXPIRATION_SECS,
        )?);

        let log_format = match lookup("AGGREGATOR_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => anyhow::bail!("AGGREGATOR_LOG_FORMAT must be text or json, got {other}"),
        };

        Ok(Self {
            listen_addr,
            storage: StorageConfig { redis, expiration },
            log_format,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }
}

fn parse_number<F, T>(lookup: &F, env_key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + ToString,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(env_key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("{env_key} must be an integer"))
}
