// Copyright 2025 Memophor Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP API handlers for the aggregator cache.
//!
//! - `GET /healthz` - Service health check
//! - `GET /metrics` - Prometheus metrics export
//! - `POST /rules/organizations/:org_id/users/:user_id/rating` - Rate a rule hit

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::metrics::Metrics;
use crate::model::{OrgId, RuleRating, RuleSelector, UserId};
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub metrics: Metrics,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    pub status: &'static str,
    pub ratings: RuleRating,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route(
            "/rules/organizations/:org_id/users/:user_id/rating",
            post(set_rule_rating),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health() -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "aggregator-cache",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.export()
}

/// Store a user's rating of a rule hit and echo the accepted rating back.
pub async fn set_rule_rating(
    State(state): State<AppState>,
    Path((org_id, user_id)): Path<(OrgId, UserId)>,
    Json(rating): Json<RuleRating>,
) -> Result<Json<RatingResponse>, AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::bad_request("user id is required"));
    }

    let selector: RuleSelector = rating.rule.parse().map_err(|err| {
        tracing::error!(error = %err, "Unable to parse rule identifier");
        AppError::from(err)
    })?;

    state
        .storage
        .rate_on_rule(
            &user_id,
            org_id,
            &selector.rule_id,
            &selector.error_key,
            rating.rating,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = %err, org_id, "Unable to store rating");
            AppError::from(err)
        })?;

    Ok(Json(RatingResponse {
        status: "ok",
        ratings: rating,
    }))
}
