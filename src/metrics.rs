// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the storage layer.
//!
//! Tracks written reports, recorded ratings and backend write health.

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

use crate::error::AppError;

/// Metrics collector for the aggregator cache
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    pub written_reports: IntCounter,
    pub ratings: IntCounter,
    pub storage_failures: IntCounter,
    pub storage_write_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let written_reports = IntCounter::with_opts(Opts::new(
            "aggregator_written_reports_total",
            "Total number of cluster reports written to the cache",
        ))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        let ratings = IntCounter::with_opts(Opts::new(
            "aggregator_ratings_total",
            "Total number of rule ratings written to the cache",
        ))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        let storage_failures = IntCounter::with_opts(Opts::new(
            "aggregator_storage_failures_total",
            "Total number of cache writes that returned an error",
        ))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        let storage_write_duration = Histogram::with_opts(
            HistogramOpts::new(
                "aggregator_storage_write_seconds",
                "Duration of cache writes in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 5.0,
            ]),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e)))?;

        registry
            .register(Box::new(written_reports.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(ratings.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(storage_failures.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;
        registry
            .register(Box::new(storage_write_duration.clone()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to register metric: {}", e)))?;

        Ok(Self {
            registry: Arc::new(registry),
            written_reports,
            ratings,
            storage_failures,
            storage_write_duration,
        })
    }

    /// Record a report written to the cache
    pub fn record_written_report(&self) {
        self.written_reports.inc();
    }

    /// Record a rating written to the cache
    pub fn record_rating(&self) {
        self.ratings.inc();
    }

    /// Record a failed cache write
    pub fn record_storage_failure(&self) {
        self.storage_failures.inc();
    }

    /// Observe the duration of a cache write in seconds
    pub fn record_write_duration(&self, seconds: f64) {
        self.storage_write_duration.observe(seconds);
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to convert metrics to string: {}",
                e
            ))
        })
    }
}
