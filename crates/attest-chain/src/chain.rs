//! Hash-chain primitives: the fixed link encoding and SHA-256 linkage.
//!
//! Hash input layout (bytes, in order):
//!   1. `chain_prev` as UTF-8 bytes (empty for the first record of a resource)
//!   2. `actor_id`
//!   3. `actor_type`
//!   4. `action`
//!   5. `resource_id`
//!   6. `resource_type`
//!   7. `created_at` as RFC 3339 UTC, nanosecond precision, `Z` suffix
//!      (e.g. `2024-05-01T12:00:00.000000000Z`)
//!
//! Fields 2–7 are each written as a 4-byte big-endian length followed by the
//! UTF-8 bytes. The digest is rendered as 64 lowercase hex characters.
//! Anyone holding a stored record can recompute its `chain_hash` from these
//! rules alone.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use attest_contracts::{AttestError, AttestResult, AuditRecord};

/// The record fields committed to by the chain hash.
#[derive(Debug, Clone, Copy)]
pub struct LinkFields<'a> {
    pub actor_id: &'a str,
    pub actor_type: &'a str,
    pub action: &'a str,
    pub resource_id: &'a str,
    pub resource_type: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a AuditRecord> for LinkFields<'a> {
    fn from(record: &'a AuditRecord) -> Self {
        Self {
            actor_id: &record.actor_id,
            actor_type: &record.actor_type,
            action: &record.action,
            resource_id: &record.resource_id,
            resource_type: &record.resource_type,
            created_at: record.created_at,
        }
    }
}

/// The linkage values for a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// Hash of the predecessor, or empty for a chain head.
    pub chain_prev: String,
    /// Hash of this record.
    pub chain_hash: String,
}

/// Render a timestamp the way the link encoding expects.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Encode the link fields in their fixed order.
///
/// Fails with `Internal` only when a field is too long for its 4-byte
/// length prefix.
pub fn encode_link_fields(fields: &LinkFields<'_>) -> AttestResult<Vec<u8>> {
    let created_at = encode_timestamp(fields.created_at);
    let parts: [(&str, &str); 6] = [
        ("actorId", fields.actor_id),
        ("actorType", fields.actor_type),
        ("action", fields.action),
        ("resourceId", fields.resource_id),
        ("resourceType", fields.resource_type),
        ("createdAt", &created_at),
    ];

    let mut out = Vec::with_capacity(parts.iter().map(|(_, v)| v.len() + 4).sum());
    for (name, value) in parts {
        let len = u32::try_from(value.len()).map_err(|_| AttestError::Internal {
            reason: format!("field '{}' is too long to encode ({} bytes)", name, value.len()),
        })?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    Ok(out)
}

/// Compute the chain hash for `fields` linked to `chain_prev`.
pub fn hash_link(chain_prev: &str, fields: &LinkFields<'_>) -> AttestResult<String> {
    let encoded = encode_link_fields(fields)?;

    let mut hasher = Sha256::new();
    hasher.update(chain_prev.as_bytes());
    hasher.update(&encoded);

    Ok(hex::encode(hasher.finalize()))
}

/// Build the linkage for a new record given the last known hash for its
/// resource (empty when the resource has no live records).
pub fn build_link(last_known_hash: &str, fields: &LinkFields<'_>) -> AttestResult<ChainLink> {
    let chain_hash = hash_link(last_known_hash, fields)?;
    Ok(ChainLink {
        chain_prev: last_known_hash.to_string(),
        chain_hash,
    })
}

/// Recompute a stored record's hash and compare it to the stored value.
pub fn verify_record(record: &AuditRecord) -> bool {
    match hash_link(&record.chain_prev, &LinkFields::from(record)) {
        Ok(recomputed) => recomputed == record.chain_hash,
        Err(_) => false,
    }
}
