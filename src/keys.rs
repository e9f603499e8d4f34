// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Cache key schema.
//!
//! Other services read the same Redis database, so these formats are part of
//! the wire contract and must not drift.

use std::borrow::Cow;

use crate::model::{OrgId, RuleSelector};

const SEPARATOR: char = ':';

/// Key of a cluster report:
/// `organization:{org_id}:cluster:{cluster_name}:request:{request_id}`.
pub fn report_key(org_id: OrgId, cluster_name: &str, request_id: &str) -> String {
    format!("organization:{org_id}:cluster:{cluster_name}:request:{request_id}")
}

/// Key of a user's rating of one rule hit:
/// `organization:{org_id}:user:{user_id}:rule:{rule_id}:error_key:{error_key}`.
///
/// Text fields are escaped so a `:` inside an identifier never reads as a
/// field boundary.
pub fn rating_key(org_id: OrgId, user_id: &str, selector: &RuleSelector) -> String {
    format!(
        "organization:{org_id}:user:{}:rule:{}:error_key:{}",
        escape(user_id),
        escape(&selector.rule_id),
        escape(&selector.error_key),
    )
}

fn escape(field: &str) -> Cow<'_, str> {
    if !field.contains(['%', SEPARATOR]) {
        return Cow::Borrowed(field);
    }

    let mut escaped = String::with_capacity(field.len() + 4);
    for ch in field.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            SEPARATOR => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
