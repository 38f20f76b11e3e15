//! Chain verification over stored records.
//!
//! Two kinds of damage are reported: a record whose stored hash no longer
//! matches its fields (`HashMismatch`), and a record whose `chain_prev` does
//! not name its actual predecessor (`BrokenLink`). Forks, where concurrent
//! writers both linked to the same predecessor, are found separately by
//! `find_forks` because they are an expected outcome of unsynchronized
//! writers rather than tampering.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use attest_contracts::{AuditRecord, ResourceKey};

use crate::chain::verify_record;

/// Outcome of walking one resource's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ChainVerdict {
    /// Every record hashes correctly and links to its predecessor.
    Valid,
    /// The record's stored `chain_hash` differs from the recomputed one.
    HashMismatch { index: usize, id: String },
    /// The record's `chain_prev` is not its predecessor's `chain_hash`.
    BrokenLink {
        index: usize,
        id: String,
        expected_prev: String,
        actual_prev: String,
    },
    /// The sequence mixes records of different resources.
    ForeignRecord { index: usize, id: String },
}

impl ChainVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainVerdict::Valid)
    }
}

/// A predecessor claimed by more than one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fork {
    pub resource: ResourceKey,
    pub chain_prev: String,
    pub record_ids: Vec<String>,
}

/// Verify a complete chain for one resource, oldest record first.
///
/// The first record must be a chain head (empty `chain_prev`). An empty
/// slice is valid.
pub fn verify_chain(records: &[AuditRecord]) -> ChainVerdict {
    walk(records, Some(""))
}

/// Verify a contiguous segment of a chain, oldest record first.
///
/// The first record's `chain_prev` is trusted as the anchor. Use this when
/// older records have aged out of retention.
pub fn verify_segment(records: &[AuditRecord]) -> ChainVerdict {
    walk(records, None)
}

fn walk(records: &[AuditRecord], anchor: Option<&str>) -> ChainVerdict {
    let Some(first) = records.first() else {
        return ChainVerdict::Valid;
    };
    let resource = first.resource();
    let mut expected_prev = anchor.unwrap_or(first.chain_prev.as_str()).to_string();

    for (index, record) in records.iter().enumerate() {
        if record.resource() != resource {
            return ChainVerdict::ForeignRecord {
                index,
                id: record.id.clone(),
            };
        }

        if record.chain_prev != expected_prev {
            warn!(
                resource = %resource,
                record_id = %record.id,
                index,
                "chain link does not match predecessor"
            );
            return ChainVerdict::BrokenLink {
                index,
                id: record.id.clone(),
                expected_prev,
                actual_prev: record.chain_prev.clone(),
            };
        }

        if !verify_record(record) {
            warn!(
                resource = %resource,
                record_id = %record.id,
                index,
                "chain hash does not match record contents"
            );
            return ChainVerdict::HashMismatch {
                index,
                id: record.id.clone(),
            };
        }

        expected_prev = record.chain_hash.clone();
    }

    ChainVerdict::Valid
}

/// Split records into per-resource sequences, keeping input order within
/// each resource.
pub fn chains_by_resource(records: &[AuditRecord]) -> BTreeMap<ResourceKey, Vec<AuditRecord>> {
    let mut chains: BTreeMap<ResourceKey, Vec<AuditRecord>> = BTreeMap::new();
    for record in records {
        chains.entry(record.resource()).or_default().push(record.clone());
    }
    chains
}

/// Find every predecessor hash claimed by two or more records of the same
/// resource.
pub fn find_forks(records: &[AuditRecord]) -> Vec<Fork> {
    let mut claims: BTreeMap<(ResourceKey, &str), Vec<String>> = BTreeMap::new();
    for record in records {
        claims
            .entry((record.resource(), record.chain_prev.as_str()))
            .or_default()
            .push(record.id.clone());
    }

    claims
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((resource, chain_prev), record_ids)| Fork {
            resource,
            chain_prev: chain_prev.to_string(),
            record_ids,
        })
        .collect()
}
