// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Identifiers, reports and ratings handled by the storage layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RuleIdError, StorageError};

pub type OrgId = u32;
pub type ClusterName = String;
pub type RequestId = String;
pub type UserId = String;
pub type RuleId = String;
pub type ErrorKey = String;
/// Position of a report in the ingestion stream.
pub type KafkaOffset = i64;
/// User feedback on a rule hit: -1 dislike, 0 reset, 1 like.
pub type UserVote = i8;

/// Separator between rule module and error key in a composite rule id.
pub const RULE_SELECTOR_SEPARATOR: char = '|';

/// A rule hit identified as `module|ERROR_KEY`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSelector {
    pub rule_id: RuleId,
    pub error_key: ErrorKey,
}

impl FromStr for RuleSelector {
    type Err = RuleIdError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| RuleIdError {
            rule: rule.to_string(),
            reason,
        };

        let (rule_id, error_key) = rule
            .split_once(RULE_SELECTOR_SEPARATOR)
            .ok_or_else(|| invalid("missing '|' separator"))?;

        if error_key.contains(RULE_SELECTOR_SEPARATOR) {
            return Err(invalid("more than one '|' separator"));
        }
        if rule_id.trim().is_empty() {
            return Err(invalid("empty rule module"));
        }
        if error_key.trim().is_empty() {
            return Err(invalid("empty error key"));
        }

        Ok(Self {
            rule_id: rule_id.to_string(),
            error_key: error_key.to_string(),
        })
    }
}

impl fmt::Display for RuleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.rule_id, RULE_SELECTOR_SEPARATOR, self.error_key)
    }
}

/// Cluster names are hyphenated UUIDs. Anything else could smuggle the
/// `:request:` delimiter into the report key.
pub fn validate_cluster_name(cluster_name: &str) -> Result<(), StorageError> {
    let invalid = |reason| StorageError::InvalidIdentifier {
        field: "cluster name",
        value: cluster_name.to_string(),
        reason,
    };

    if cluster_name.len() != uuid::fmt::Hyphenated::LENGTH {
        return Err(invalid("expected a hyphenated UUID"));
    }
    uuid::Uuid::try_parse(cluster_name).map_err(|_| invalid("expected a hyphenated UUID"))?;

    Ok(())
}

/// Request ids end the report key, so they only need to be non-empty and
/// free of the key delimiter.
pub fn validate_request_id(request_id: &str) -> Result<(), StorageError> {
    let invalid = |reason| StorageError::InvalidIdentifier {
        field: "request id",
        value: request_id.to_string(),
        reason,
    };

    if request_id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if request_id.contains(':') {
        return Err(invalid("must not contain ':'"));
    }

    Ok(())
}

/// Body of a rating submission, echoed back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRating {
    pub rule: String,
    pub rating: UserVote,
}

/// One rule that fired on a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOnReport {
    #[serde(rename = "component")]
    pub module: String,
    #[serde(rename = "key")]
    pub error_key: ErrorKey,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: serde_json::Value,
}

/// Structured form of a cluster report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportRules {
    #[serde(rename = "reports", default)]
    pub hit_rules: Vec<RuleOnReport>,
    #[serde(rename = "skips", default)]
    pub skipped_rules: Vec<serde_json::Value>,
    #[serde(rename = "pass", default)]
    pub passed_rules: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_count: usize,
}

/// Value stored under a report key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub org_id: OrgId,
    pub cluster_name: ClusterName,
    pub request_id: RequestId,
    /// Report exactly as received from the ingestion pipeline.
    pub report: String,
    pub rule_hits: Vec<RuleOnReport>,
    pub gathered_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
    pub kafka_offset: KafkaOffset,
}

/// Value stored under a rating key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRating {
    pub user_id: UserId,
    pub org_id: OrgId,
    pub rule_id: RuleId,
    pub error_key: ErrorKey,
    pub rating: UserVote,
    pub rated_at: DateTime<Utc>,
}
