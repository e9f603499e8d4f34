// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Cache-backed storage for cluster insights reports and rule ratings.
//!
//! Reports and ratings are written to Redis under deterministic keys with a
//! configured expiration. The write surface is the [`Storage`] trait;
//! [`RedisStorage`] implements it on top of a [`ConnectionManager`], which
//! accepts any [`KeyValueBackend`] so tests can swap Redis for
//! [`MemoryBackend`].

pub mod api;
pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod storage;

pub use backend::{KeyValueBackend, RedisBackend};
pub use config::{AppConfig, RedisConfig, StorageConfig};
pub use connection::{ConnectionManager, ConnectionMode};
pub use error::{AppError, ConfigError, RuleIdError, StorageError};
pub use memory::MemoryBackend;
pub use metrics::Metrics;
pub use storage::{RedisStorage, Storage};
