//! # attest-chain
//!
//! SHA-256 hash chains over audit records.
//!
//! ## Overview
//!
//! Each record commits to the previous record for the same resource through
//! `chain_prev`, and to its own identity fields through `chain_hash`.
//! Editing any committed field, deleting a record, or reordering records
//! breaks the chain and is detected by recomputation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use attest_chain::{build_link, verify_chain, LinkFields};
//!
//! let link = build_link(&last_hash, &LinkFields { /* ... */ })?;
//! assert!(verify_chain(&records).is_valid());
//! ```

pub mod chain;
pub mod verify;

pub use chain::{
    build_link, encode_link_fields, encode_timestamp, hash_link, verify_record, ChainLink,
    LinkFields,
};
pub use verify::{chains_by_resource, find_forks, verify_chain, verify_segment, ChainVerdict, Fork};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use attest_contracts::{new_record_id, AuditRecord};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn ts(secs: i64, nanos: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, nanos).unwrap()
    }

    /// Append a correctly linked record for `resource_id` to `chain`.
    fn push(chain: &mut Vec<AuditRecord>, resource_id: &str, action: &str, secs: i64) {
        let prev = chain
            .iter()
            .rev()
            .find(|r| r.resource_id == resource_id)
            .map(|r| r.chain_hash.clone())
            .unwrap_or_default();
        chain.push(linked(&prev, resource_id, action, secs));
    }

    fn linked(prev: &str, resource_id: &str, action: &str, secs: i64) -> AuditRecord {
        let mut record = AuditRecord {
            id: new_record_id(),
            actor_id: "u1".to_string(),
            actor_type: "user".to_string(),
            action: action.to_string(),
            resource_id: resource_id.to_string(),
            resource_type: "session".to_string(),
            ip: None,
            user_agent: None,
            metadata: None,
            created_at: ts(secs, 500),
            chain_prev: String::new(),
            chain_hash: String::new(),
            idem_fingerprint: String::new(),
        };
        let link = build_link(prev, &LinkFields::from(&record)).unwrap();
        record.chain_prev = link.chain_prev;
        record.chain_hash = link.chain_hash;
        record
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    #[test]
    fn timestamp_encoding_is_fixed_width_utc() {
        assert_eq!(encode_timestamp(ts(0, 0)), "2023-11-14T22:13:20.000000000Z");
        assert_eq!(encode_timestamp(ts(0, 42)), "2023-11-14T22:13:20.000000042Z");
    }

    #[test]
    fn encoding_is_length_prefixed_in_fixed_order() {
        let fields = LinkFields {
            actor_id: "u1",
            actor_type: "",
            action: "login",
            resource_id: "r1",
            resource_type: "session",
            created_at: ts(0, 0),
        };
        let bytes = encode_link_fields(&fields).unwrap();

        assert_eq!(&bytes[0..4], &2u32.to_be_bytes());
        assert_eq!(&bytes[4..6], b"u1");
        // Empty actor_type is still a length prefix of zero.
        assert_eq!(&bytes[6..10], &0u32.to_be_bytes());
        assert_eq!(&bytes[10..14], &5u32.to_be_bytes());
        assert_eq!(&bytes[14..19], b"login");
        assert!(bytes.ends_with(b"2023-11-14T22:13:20.000000000Z"));
    }

    /// Length prefixes keep adjacent fields from being re-split into a
    /// colliding encoding.
    #[test]
    fn shifting_bytes_between_fields_changes_the_hash() {
        let a = LinkFields {
            actor_id: "ab",
            actor_type: "c",
            action: "x",
            resource_id: "r",
            resource_type: "t",
            created_at: ts(0, 0),
        };
        let b = LinkFields { actor_id: "a", actor_type: "bc", ..a };
        assert_ne!(hash_link("", &a).unwrap(), hash_link("", &b).unwrap());
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let record = linked("", "r1", "login", 0);
        assert_eq!(record.chain_hash.len(), 64);
        assert!(record
            .chain_hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    // ── Linkage ───────────────────────────────────────────────────────────────

    #[test]
    fn first_link_has_empty_prev() {
        let record = linked("", "r1", "login", 0);
        assert!(record.is_chain_head());
        assert!(!record.chain_hash.is_empty());
    }

    #[test]
    fn build_link_carries_last_hash_as_prev() {
        let first = linked("", "r1", "login", 0);
        let second = linked(&first.chain_hash, "r1", "logout", 1);
        assert_eq!(second.chain_prev, first.chain_hash);
        assert_ne!(second.chain_hash, first.chain_hash);
    }

    #[test]
    fn same_fields_different_prev_hash_differently() {
        let record = linked("", "r1", "login", 0);
        let fields = LinkFields::from(&record);
        assert_ne!(
            hash_link("", &fields).unwrap(),
            hash_link("deadbeef", &fields).unwrap()
        );
    }

    #[test]
    fn recomputation_reproduces_stored_hash() {
        let record = linked("", "r1", "login", 0);
        assert!(verify_record(&record));

        // Through JSON and back, as an external auditor would see it.
        let json = serde_json::to_string(&record).unwrap();
        let restored: AuditRecord = serde_json::from_str(&json).unwrap();
        assert!(verify_record(&restored));
    }

    #[test]
    fn metadata_is_not_committed() {
        let mut record = linked("", "r1", "login", 0);
        let mut meta = attest_contracts::Metadata::new();
        meta.insert("note".to_string(), serde_json::json!("anything"));
        record.metadata = Some(meta);
        assert!(verify_record(&record));
    }

    // ── verify_chain ──────────────────────────────────────────────────────────

    #[test]
    fn sequential_chain_is_valid() {
        let mut chain = Vec::new();
        for (i, action) in ["login", "read", "write", "logout"].iter().enumerate() {
            push(&mut chain, "r1", action, i as i64);
        }
        assert_eq!(verify_chain(&chain), ChainVerdict::Valid);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].chain_prev, pair[0].chain_hash);
        }
    }

    #[test]
    fn empty_chain_is_valid() {
        assert!(verify_chain(&[]).is_valid());
        assert!(verify_segment(&[]).is_valid());
    }

    #[test]
    fn edited_field_is_a_hash_mismatch() {
        let mut chain = Vec::new();
        push(&mut chain, "r1", "login", 0);
        push(&mut chain, "r1", "read", 1);
        push(&mut chain, "r1", "logout", 2);

        chain[1].actor_id = "mallory".to_string();

        match verify_chain(&chain) {
            ChainVerdict::HashMismatch { index, id } => {
                assert_eq!(index, 1);
                assert_eq!(id, chain[1].id);
            }
            other => panic!("expected HashMismatch, got {:?}", other),
        }
    }

    #[test]
    fn deleted_record_is_a_broken_link() {
        let mut chain = Vec::new();
        push(&mut chain, "r1", "login", 0);
        push(&mut chain, "r1", "read", 1);
        push(&mut chain, "r1", "logout", 2);

        let removed = chain.remove(1);

        match verify_chain(&chain) {
            ChainVerdict::BrokenLink { index, actual_prev, .. } => {
                assert_eq!(index, 1);
                assert_eq!(actual_prev, removed.chain_hash);
            }
            other => panic!("expected BrokenLink, got {:?}", other),
        }
    }

    #[test]
    fn chain_not_starting_at_head_fails_full_but_passes_segment() {
        let mut chain = Vec::new();
        push(&mut chain, "r1", "login", 0);
        push(&mut chain, "r1", "read", 1);
        push(&mut chain, "r1", "logout", 2);

        // Oldest record aged out of retention.
        let retained = &chain[1..];
        assert!(!verify_chain(retained).is_valid());
        assert!(verify_segment(retained).is_valid());
    }

    #[test]
    fn mixed_resources_are_rejected() {
        let mut chain = Vec::new();
        push(&mut chain, "r1", "login", 0);
        push(&mut chain, "r2", "login", 1);
        assert!(matches!(verify_chain(&chain), ChainVerdict::ForeignRecord { index: 1, .. }));
    }

    // ── Forks ─────────────────────────────────────────────────────────────────

    #[test]
    fn fork_is_detected() {
        let head = linked("", "r1", "login", 0);
        let left = linked(&head.chain_hash, "r1", "read", 1);
        let right = linked(&head.chain_hash, "r1", "write", 1);
        let records = vec![head.clone(), left.clone(), right.clone()];

        let forks = find_forks(&records);
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].chain_prev, head.chain_hash);
        assert_eq!(forks[0].record_ids, vec![left.id, right.id]);
    }

    #[test]
    fn independent_resources_are_not_forks() {
        let mut records = Vec::new();
        push(&mut records, "r1", "login", 0);
        push(&mut records, "r2", "login", 0);
        assert!(find_forks(&records).is_empty());
    }

    #[test]
    fn chains_by_resource_groups_in_input_order() {
        let mut records = Vec::new();
        push(&mut records, "r1", "login", 0);
        push(&mut records, "r2", "login", 1);
        push(&mut records, "r1", "logout", 2);

        let chains = chains_by_resource(&records);
        assert_eq!(chains.len(), 2);
        let r1 = &chains[&attest_contracts::ResourceKey::new("session", "r1")];
        assert_eq!(r1.len(), 2);
        assert_eq!(r1[0].action, "login");
        assert!(verify_chain(r1).is_valid());
    }
}
