// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of the storage backend connection.
//!
//! A [`ConnectionManager`] is built once from a validated [`RedisConfig`].
//! It either wraps a live backend or runs in disabled mode when no endpoint
//! is configured. Every operation issued through it is bounded by the
//! configured timeout and aborts when its cancellation token fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::{KeyValueBackend, RedisBackend};
use crate::config::RedisConfig;
use crate::error::{ConfigError, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Active,
    /// No endpoint configured: writes are accepted and dropped.
    Disabled,
}

#[derive(Clone)]
pub struct ConnectionManager {
    backend: Option<Arc<dyn KeyValueBackend>>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Validates `config` and prepares a lazy connection. Nothing is sent
    /// over the network until [`init`](Self::init) or the first write.
    pub fn new(config: &RedisConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        if config.is_disabled() {
            tracing::info!("Redis endpoint not configured; storage runs in disabled mode");
            return Ok(Self {
                backend: None,
                timeout: Some(config.timeout()),
                cancel: CancellationToken::new(),
            });
        }

        let backend = RedisBackend::new(config)?;
        tracing::debug!(
            endpoint = %config.endpoint,
            database = config.database,
            timeout_seconds = config.timeout_seconds,
            "prepared Redis connection"
        );

        Ok(Self::with_backend(backend, Some(config.timeout())))
    }

    /// Wraps an arbitrary backend, e.g. an in-memory store.
    pub fn with_backend(backend: impl KeyValueBackend + 'static, timeout: Option<Duration>) -> Self {
        Self {
            backend: Some(Arc::new(backend)),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Aborts every in-flight and future operation once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn mode(&self) -> ConnectionMode {
        if self.backend.is_some() {
            ConnectionMode::Active
        } else {
            ConnectionMode::Disabled
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Connects if needed and verifies the backend answers. Safe to call
    /// repeatedly.
    pub async fn init(&self) -> Result<(), StorageError> {
        let Some(backend) = &self.backend else {
            if self.cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            return Ok(());
        };

        self.bounded(backend.ping()).await?;
        tracing::info!("storage backend connection verified");

        Ok(())
    }

    /// Single `SET key value EX expiration` against the backend.
    pub async fn set_with_expiration(
        &self,
        key: String,
        value: String,
        expiration: Duration,
    ) -> Result<(), StorageError> {
        let Some(backend) = &self.backend else {
            if self.cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            tracing::debug!(key = %key, "storage disabled; write skipped");
            return Ok(());
        };

        self.bounded(backend.set_with_expiration(key, value, expiration))
            .await
    }

    async fn bounded<F, T>(&self, operation: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let limited = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(StorageError::Timeout(limit)),
                },
                None => operation.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StorageError::Cancelled),
            result = limited => result,
        }
    }
}
