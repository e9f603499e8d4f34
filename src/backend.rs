use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use crate::config::RedisConfig;
use crate::error::{ConfigError, StorageError};

/// Capability the storage layer needs from a key-value store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value, and lets
    /// the store evict it once `expiration` has passed.
    async fn set_with_expiration(
        &self,
        key: String,
        value: String,
        expiration: Duration,
    ) -> Result<(), StorageError>;

    /// Round trip to the store to confirm it is reachable.
    async fn ping(&self) -> Result<(), StorageError>;
}

/// Redis-backed store. Connects on first use and shares one reconnecting
/// multiplexed connection between all callers afterwards.
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    connection: Arc<OnceCell<RedisConnection>>,
}

impl RedisBackend {
    pub fn new(config: &RedisConfig) -> Result<Self, ConfigError> {
        let info = config.connection_info()?;
        let client = redis::Client::open(info).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            source,
        })?;

        Ok(Self {
            client,
            connection: Arc::new(OnceCell::new()),
        })
    }

    async fn connection(&self) -> Result<RedisConnection, StorageError> {
        let conn = self
            .connection
            .get_or_try_init(|| self.client.get_connection_manager())
            .await?;

        Ok(conn.clone())
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn set_with_expiration(
        &self,
        key: String,
        value: String,
        expiration: Duration,
    ) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key, value, expiration_seconds(expiration))
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;

        Ok(())
    }
}

/// Whole seconds for `SET .. EX`, rounded up so a sub-second remainder
/// never shortens the lifetime.
fn expiration_seconds(expiration: Duration) -> u64 {
    expiration.as_secs() + u64::from(expiration.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_rounds_up_to_whole_seconds() {
        assert_eq!(expiration_seconds(Duration::from_secs(60)), 60);
        assert_eq!(expiration_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(expiration_seconds(Duration::from_millis(1)), 1);
    }

    #[test]
    fn construction_does_not_connect() {
        let config = RedisConfig {
            endpoint: "localhost:12345".to_string(),
            database: 0,
            timeout_seconds: 1,
            password: String::new(),
        };
        assert!(RedisBackend::new(&config).is_ok());
    }

    #[tokio::test]
    async fn unreachable_server_fails_ping() {
        let config = RedisConfig {
            endpoint: "127.0.0.1:1".to_string(),
            database: 0,
            timeout_seconds: 1,
            password: String::new(),
        };
        let backend = RedisBackend::new(&config).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), backend.ping()).await;
        assert!(!matches!(result, Ok(Ok(()))), "ping against a closed port succeeded");
    }
}
