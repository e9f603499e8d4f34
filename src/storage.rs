// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Write path for cluster reports and rule ratings.
//!
//! Every write is a single `SET .. EX` through the [`ConnectionManager`]:
//! no retries, no ordering checks against the stream offset, last write wins.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::StorageConfig;
use crate::connection::{ConnectionManager, ConnectionMode};
use crate::error::{ConfigError, StorageError};
use crate::keys;
use crate::metrics::Metrics;
use crate::model::{
    self, ErrorKey, KafkaOffset, OrgId, ReportRules, RuleId, RuleSelector, StoredRating,
    StoredReport, UserId, UserVote,
};

/// Entry points used by the ingestion pipeline and the HTTP layer.
#[async_trait]
pub trait Storage: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn write_report_for_cluster(
        &self,
        org_id: OrgId,
        cluster_name: &str,
        report: &str,
        parsed_report: &ReportRules,
        gathered_at: DateTime<Utc>,
        last_checked_at: DateTime<Utc>,
        stored_at: DateTime<Utc>,
        kafka_offset: KafkaOffset,
        request_id: &str,
    ) -> Result<(), StorageError>;

    async fn rate_on_rule(
        &self,
        user_id: &str,
        org_id: OrgId,
        rule_id: &str,
        error_key: &str,
        rating: UserVote,
    ) -> Result<(), StorageError>;
}

/// Redis implementation of [`Storage`].
#[derive(Clone)]
pub struct RedisStorage {
    connection: ConnectionManager,
    expiration: Duration,
    metrics: Option<Metrics>,
}

impl RedisStorage {
    /// Fails without touching the network if the configuration is invalid.
    pub fn new(config: &StorageConfig) -> Result<Self, ConfigError> {
        let connection = ConnectionManager::new(&config.redis)?;
        Self::with_connection(connection, config.expiration)
    }

    pub fn with_connection(
        connection: ConnectionManager,
        expiration: Duration,
    ) -> Result<Self, ConfigError> {
        if expiration.is_zero() {
            return Err(ConfigError::ZeroExpiration);
        }

        Ok(Self {
            connection,
            expiration,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        self.connection.init().await
    }

    pub fn mode(&self) -> ConnectionMode {
        self.connection.mode()
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Metrics for acknowledged writes; disabled storage writes nothing.
    fn written_metrics(&self) -> Option<&Metrics> {
        match self.connection.mode() {
            ConnectionMode::Active => self.metrics.as_ref(),
            ConnectionMode::Disabled => None,
        }
    }

    async fn store(&self, key: String, value: String) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .connection
            .set_with_expiration(key, value, self.expiration)
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_write_duration(start.elapsed().as_secs_f64());
            if result.is_err() {
                metrics.record_storage_failure();
            }
        }

        result
    }
}

#[async_trait]
impl Storage for RedisStorage {
    #[allow(clippy::too_many_arguments)]
    async fn write_report_for_cluster(
        &self,
        org_id: OrgId,
        cluster_name: &str,
        report: &str,
        parsed_report: &ReportRules,
        gathered_at: DateTime<Utc>,
        last_checked_at: DateTime<Utc>,
        stored_at: DateTime<Utc>,
        kafka_offset: KafkaOffset,
        request_id: &str,
    ) -> Result<(), StorageError> {
        model::validate_cluster_name(cluster_name)?;
        model::validate_request_id(request_id)?;
        let key = keys::report_key(org_id, cluster_name, request_id);

        let entry = StoredReport {
            org_id,
            cluster_name: cluster_name.to_string(),
            request_id: request_id.to_string(),
            report: report.to_string(),
            rule_hits: parsed_report.hit_rules.clone(),
            gathered_at,
            last_checked_at,
            stored_at,
            kafka_offset,
        };
        let value = serde_json::to_string(&entry)?;

        self.store(key.clone(), value).await?;

        if let Some(metrics) = self.written_metrics() {
            metrics.record_written_report();
        }
        tracing::debug!(
            key = %key,
            org_id,
            cluster = cluster_name,
            offset = kafka_offset,
            rule_hits = entry.rule_hits.len(),
            "report written to cache"
        );

        Ok(())
    }

    async fn rate_on_rule(
        &self,
        user_id: &str,
        org_id: OrgId,
        rule_id: &str,
        error_key: &str,
        rating: UserVote,
    ) -> Result<(), StorageError> {
        let selector = RuleSelector {
            rule_id: RuleId::from(rule_id),
            error_key: ErrorKey::from(error_key),
        };
        let key = keys::rating_key(org_id, user_id, &selector);

        let entry = StoredRating {
            user_id: UserId::from(user_id),
            org_id,
            rule_id: selector.rule_id,
            error_key: selector.error_key,
            rating,
            rated_at: Utc::now(),
        };
        let value = serde_json::to_string(&entry)?;

        self.store(key.clone(), value).await?;

        if let Some(metrics) = self.written_metrics() {
            metrics.record_rating();
        }
        tracing::debug!(key = %key, org_id, rating, "rating written to cache");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mockall::Sequence;

    use super::*;
    use crate::backend::MockKeyValueBackend;
    use crate::config::RedisConfig;
    use crate::memory::MemoryBackend;

    const EXPIRATION: Duration = Duration::from_secs(3600);
    const CLUSTER: &str = "84f7eedc-0dd8-49cd-9d4d-f6646df3a5bc";

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 5, 26, 12, 0, 0).unwrap()
    }

    fn storage_with(backend: MockKeyValueBackend) -> RedisStorage {
        RedisStorage::with_connection(ConnectionManager::with_backend(backend, None), EXPIRATION)
            .unwrap()
    }

    async fn write_report(storage: &RedisStorage) -> Result<(), StorageError> {
        storage
            .write_report_for_cluster(
                1,
                CLUSTER,
                "{}",
                &ReportRules::default(),
                timestamp(),
                timestamp(),
                timestamp(),
                42,
                "r1",
            )
            .await
    }

    #[test]
    fn rejects_zero_expiration() {
        let config = StorageConfig {
            redis: RedisConfig {
                endpoint: "localhost:12345".to_string(),
                database: 0,
                timeout_seconds: 1,
                password: String::new(),
            },
            expiration: Duration::ZERO,
        };

        assert!(matches!(
            RedisStorage::new(&config),
            Err(ConfigError::ZeroExpiration)
        ));
    }

    #[tokio::test]
    async fn report_is_written_once_with_configured_expiration() {
        let mut backend = MockKeyValueBackend::new();
        backend
            .expect_set_with_expiration()
            .withf(|key, value, expiration| {
                key.as_str()
                    == "organization:1:cluster:84f7eedc-0dd8-49cd-9d4d-f6646df3a5bc:request:r1"
                    && serde_json::from_str::<StoredReport>(value).is_ok()
                    && *expiration == EXPIRATION
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        write_report(&storage_with(backend)).await.unwrap();
    }

    #[tokio::test]
    async fn report_write_failure_is_returned_without_retry() {
        let mut backend = MockKeyValueBackend::new();
        backend
            .expect_set_with_expiration()
            .times(1)
            .returning(|_, _, _| {
                Err(StorageError::Connection(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection refused",
                ))))
            });

        let storage = storage_with(backend).with_metrics(Metrics::new().unwrap());
        let err = write_report(&storage).await.unwrap_err();

        assert!(matches!(err, StorageError::Connection(_)));
        let metrics = storage.metrics.as_ref().unwrap();
        assert_eq!(metrics.storage_failures.get(), 1);
        assert_eq!(metrics.written_reports.get(), 0);
    }

    #[tokio::test]
    async fn rating_is_written_under_composite_key() {
        let mut backend = MockKeyValueBackend::new();
        backend
            .expect_set_with_expiration()
            .withf(|key, value, expiration| {
                let stored: StoredRating = match serde_json::from_str(value) {
                    Ok(stored) => stored,
                    Err(_) => return false,
                };
                key.as_str()
                    == "organization:1:user:u1:rule:ccx_rules_ocp.external.bug_rules.bug_123:error_key:ERROR_KEY"
                    && stored.rating == -1
                    && stored.user_id == "u1"
                    && *expiration == EXPIRATION
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let storage = storage_with(backend).with_metrics(Metrics::new().unwrap());
        storage
            .rate_on_rule("u1", 1, "ccx_rules_ocp.external.bug_rules.bug_123", "ERROR_KEY", -1)
            .await
            .unwrap();

        assert_eq!(storage.metrics.as_ref().unwrap().ratings.get(), 1);
    }

    #[tokio::test]
    async fn rating_write_failure_is_returned_without_retry() {
        let mut backend = MockKeyValueBackend::new();
        backend
            .expect_set_with_expiration()
            .times(1)
            .returning(|_, _, _| Err(StorageError::Timeout(Duration::from_secs(1))));

        let err = storage_with(backend)
            .rate_on_rule("u1", 1, "rule", "KEY", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout(_)));
    }

    #[tokio::test]
    async fn identifiers_that_would_collide_are_refused_before_writing() {
        let backend = MemoryBackend::new();
        let storage = RedisStorage::with_connection(
            ConnectionManager::with_backend(backend.clone(), None),
            EXPIRATION,
        )
        .unwrap();

        for (cluster_name, request_id) in [("c1:request:r1", "x"), ("c1", "r1:request:x")] {
            let err = storage
                .write_report_for_cluster(
                    1,
                    cluster_name,
                    "{}",
                    &ReportRules::default(),
                    timestamp(),
                    timestamp(),
                    timestamp(),
                    42,
                    request_id,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::InvalidIdentifier { .. }));
        }

        let err = storage
            .write_report_for_cluster(
                1,
                CLUSTER,
                "{}",
                &ReportRules::default(),
                timestamp(),
                timestamp(),
                timestamp(),
                42,
                "r1:request:x",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidIdentifier { field: "request id", .. }
        ));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn disabled_storage_does_not_count_writes() {
        let config = StorageConfig {
            redis: RedisConfig {
                endpoint: String::new(),
                database: 0,
                timeout_seconds: 1,
                password: String::new(),
            },
            expiration: EXPIRATION,
        };
        let storage = RedisStorage::new(&config)
            .unwrap()
            .with_metrics(Metrics::new().unwrap());

        write_report(&storage).await.unwrap();
        storage.rate_on_rule("u1", 1, "rule", "KEY", 1).await.unwrap();

        let metrics = storage.metrics.as_ref().unwrap();
        assert_eq!(metrics.written_reports.get(), 0);
        assert_eq!(metrics.ratings.get(), 0);
    }

    #[tokio::test]
    async fn stale_offset_still_overwrites() {
        let mut backend = MockKeyValueBackend::new();
        let mut seq = Sequence::new();
        for offset in [10, 5] {
            backend
                .expect_set_with_expiration()
                .withf(move |_, value, _| {
                    serde_json::from_str::<StoredReport>(value)
                        .map(|stored| stored.kafka_offset == offset)
                        .unwrap_or(false)
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }

        let storage = storage_with(backend);
        for offset in [10, 5] {
            storage
                .write_report_for_cluster(
                    1,
                    CLUSTER,
                    "{}",
                    &ReportRules::default(),
                    timestamp(),
                    timestamp(),
                    timestamp(),
                    offset,
                    "r1",
                )
                .await
                .unwrap();
        }
    }
}
