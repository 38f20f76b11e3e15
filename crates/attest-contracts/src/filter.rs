//! List query parameters and their normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::AuditRecord;

/// Page size used when the caller gives none (or a non-positive one).
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Largest page a single list call may return.
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Filter for listing audit records.
///
/// String filters are equality matches; `None` or an empty string means
/// "any". `since` and `until` are inclusive bounds on `created_at`. Call
/// `normalized()` before handing the filter to a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListFilter {
    pub actor_id: Option<String>,
    pub actor_type: Option<String>,
    pub action: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl ListFilter {
    /// Clamp paging into range.
    ///
    /// `limit` becomes `DEFAULT_LIST_LIMIT` when ≤ 0 and is capped at
    /// `MAX_LIST_LIMIT`; a negative `offset` becomes 0.
    pub fn normalized(mut self) -> Self {
        if self.limit <= 0 {
            self.limit = DEFAULT_LIST_LIMIT;
        }
        self.limit = self.limit.min(MAX_LIST_LIMIT);
        self.offset = self.offset.max(0);
        self
    }

    /// Restrict to one resource's records.
    pub fn for_resource(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            resource_id: Some(resource_id.into()),
            ..Self::default()
        }
    }

    /// True when `record` passes every equality filter and the time range.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        field_matches(&self.actor_id, &record.actor_id)
            && field_matches(&self.actor_type, &record.actor_type)
            && field_matches(&self.action, &record.action)
            && field_matches(&self.resource_id, &record.resource_id)
            && field_matches(&self.resource_type, &record.resource_type)
            && self.since.map_or(true, |since| record.created_at >= since)
            && self.until.map_or(true, |until| record.created_at <= until)
    }
}

fn field_matches(wanted: &Option<String>, actual: &str) -> bool {
    match wanted.as_deref() {
        None | Some("") => true,
        Some(value) => value == actual,
    }
}
