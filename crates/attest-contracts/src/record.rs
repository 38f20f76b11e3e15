//! Audit records and the requests that produce them.
//!
//! `CreateAuditRequest` is what a client submits. `AuditRecord` is what the
//! ingestion service stores: the request fields plus the server-assigned
//! identity, timestamp, chain linkage and idempotency fingerprint. Records are
//! never modified after creation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-supplied structured context. Never interpreted by the pipeline.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Generate a fresh record identifier.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The `(resourceType, resourceId)` pair a chain is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

/// One immutable audit record: who did what to which resource, and when.
///
/// `chain_prev` and `chain_hash` link the record to its predecessor for the
/// same resource. See `attest-chain` for the exact hash input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Server-generated unique identifier.
    pub id: String,

    pub actor_id: String,
    pub actor_type: String,
    pub action: String,
    pub resource_id: String,
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Assigned by the service at creation (UTC).
    pub created_at: DateTime<Utc>,

    /// `chain_hash` of the previous record for this resource; empty for the
    /// first record.
    #[serde(default)]
    pub chain_prev: String,

    /// Lowercase hex SHA-256 committing to `chain_prev` and the identity
    /// fields of this record.
    pub chain_hash: String,

    /// Hash of the client's idempotency token; empty when none was given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub idem_fingerprint: String,
}

impl AuditRecord {
    /// The resource this record's chain belongs to.
    pub fn resource(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type.clone(), self.resource_id.clone())
    }

    /// True for the first record of a chain.
    pub fn is_chain_head(&self) -> bool {
        self.chain_prev.is_empty()
    }
}

/// A create request as submitted by a client.
///
/// Missing JSON fields deserialize to empty strings so that validation, not
/// parsing, decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateAuditRequest {
    pub actor_id: String,
    pub actor_type: String,
    pub action: String,
    pub resource_id: String,
    pub resource_type: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<Metadata>,

    /// Optional client token identifying retries of the same logical write.
    pub idempotency_key: Option<String>,
}

impl CreateAuditRequest {
    /// Build a request with the identity fields set and nothing else.
    pub fn new(
        actor_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            ..Self::default()
        }
    }

    pub fn with_actor_type(mut self, actor_type: impl Into<String>) -> Self {
        self.actor_type = actor_type.into();
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Name of the first required field that is empty, if any.
    ///
    /// Required: `actorId`, `action`, `resourceId`, `resourceType`.
    /// `actorType` is descriptive and may be empty.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("actorId", &self.actor_id),
            ("action", &self.action),
            ("resourceId", &self.resource_id),
            ("resourceType", &self.resource_type),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }

    /// The resource this request targets.
    pub fn resource(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type.clone(), self.resource_id.clone())
    }
}
