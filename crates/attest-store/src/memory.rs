//! In-memory implementation of `AuditStore`.
//!
//! `MemoryAuditStore` keeps every record in a `BTreeMap` keyed by insertion
//! sequence, with secondary indexes by id, by resource, and by idempotency
//! fingerprint (unique, sparse). All state sits behind one `Mutex`, held
//! only for the duration of a single operation.
//!
//! Retention: with a horizon configured, a record whose `created_at` is
//! older than `now - horizon` is invisible to every read and is purged on
//! the next write or on `purge_expired()`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use attest_contracts::{AttestError, AttestResult, AuditRecord, ListFilter, ResourceKey};
use attest_core::{AuditStore, InsertOutcome};

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct StoreState {
    next_seq: u64,
    records: BTreeMap<u64, AuditRecord>,
    by_id: HashMap<String, u64>,
    by_fingerprint: HashMap<String, u64>,
    by_resource: HashMap<ResourceKey, Vec<u64>>,
}

impl StoreState {
    fn push(&mut self, record: AuditRecord) -> AttestResult<AuditRecord> {
        if self.by_id.contains_key(&record.id) {
            return Err(AttestError::StorageUnavailable {
                reason: format!("duplicate record id '{}'", record.id),
            });
        }
        if !record.idem_fingerprint.is_empty()
            && self.by_fingerprint.contains_key(&record.idem_fingerprint)
        {
            return Err(AttestError::StorageUnavailable {
                reason: "unique fingerprint constraint violated".to_string(),
            });
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_id.insert(record.id.clone(), seq);
        if !record.idem_fingerprint.is_empty() {
            self.by_fingerprint.insert(record.idem_fingerprint.clone(), seq);
        }
        self.by_resource.entry(record.resource()).or_default().push(seq);
        self.records.insert(seq, record.clone());

        Ok(record)
    }

    fn remove(&mut self, seq: u64) {
        let Some(record) = self.records.remove(&seq) else {
            return;
        };
        self.by_id.remove(&record.id);
        if !record.idem_fingerprint.is_empty() {
            self.by_fingerprint.remove(&record.idem_fingerprint);
        }
        let key = record.resource();
        if let Some(seqs) = self.by_resource.get_mut(&key) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.by_resource.remove(&key);
            }
        }
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An in-memory audit store with optional retention.
#[derive(Default)]
pub struct MemoryAuditStore {
    state: Mutex<StoreState>,
    retention: Option<Duration>,
    unavailable: AtomicBool,
}

impl MemoryAuditStore {
    /// A store that keeps records forever.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that expires records older than `horizon`.
    pub fn with_retention(horizon: Duration) -> Self {
        Self {
            retention: Some(horizon),
            ..Self::default()
        }
    }

    /// A store that expires records older than `days` days.
    pub fn with_retention_days(days: u32) -> Self {
        Self::with_retention(Duration::days(i64::from(days)))
    }

    /// Simulate an outage: every call fails with `StorageUnavailable` until
    /// set back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Remove every expired record. Returns how many were removed.
    pub fn purge_expired(&self) -> AttestResult<usize> {
        let mut state = self.state()?;
        Ok(self.purge(&mut state, Utc::now()))
    }

    /// Every live record in insertion order.
    pub fn export(&self) -> AttestResult<Vec<AuditRecord>> {
        let state = self.state()?;
        let now = Utc::now();
        Ok(state
            .records
            .values()
            .filter(|r| self.is_live(r, now))
            .cloned()
            .collect())
    }

    /// Number of live records.
    pub fn len(&self) -> AttestResult<usize> {
        Ok(self.export()?.len())
    }

    pub fn is_empty(&self) -> AttestResult<bool> {
        Ok(self.len()? == 0)
    }

    fn state(&self) -> AttestResult<MutexGuard<'_, StoreState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AttestError::StorageUnavailable {
                reason: "memory store marked unavailable".to_string(),
            });
        }
        self.state.lock().map_err(|e| AttestError::StorageUnavailable {
            reason: format!("store state lock poisoned: {}", e),
        })
    }

    /// Oldest `created_at` still live. `None` keeps everything, including
    /// when the horizon reaches past the earliest representable time.
    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.retention
            .and_then(|horizon| now.checked_sub_signed(horizon))
    }

    fn is_live(&self, record: &AuditRecord, now: DateTime<Utc>) -> bool {
        self.cutoff(now).map_or(true, |cutoff| record.created_at >= cutoff)
    }

    fn purge(&self, state: &mut StoreState, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = self.cutoff(now) else {
            return 0;
        };
        let expired: Vec<u64> = state
            .records
            .iter()
            .filter(|(_, r)| r.created_at < cutoff)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &expired {
            state.remove(*seq);
        }
        if !expired.is_empty() {
            info!(purged = expired.len(), cutoff = %cutoff, "expired audit records purged");
        }
        expired.len()
    }

    fn live_by_seq(&self, state: &StoreState, seq: u64, now: DateTime<Utc>) -> Option<AuditRecord> {
        state
            .records
            .get(&seq)
            .filter(|r| self.is_live(r, now))
            .cloned()
    }
}

// ── AuditStore impl ───────────────────────────────────────────────────────────

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, record: AuditRecord) -> AttestResult<AuditRecord> {
        let mut state = self.state()?;
        self.purge(&mut state, Utc::now());
        state.push(record)
    }

    async fn insert_idempotent(&self, record: AuditRecord) -> AttestResult<InsertOutcome> {
        let mut state = self.state()?;
        self.purge(&mut state, Utc::now());

        if state.by_fingerprint.contains_key(&record.idem_fingerprint) {
            debug!(fingerprint = %record.idem_fingerprint, "fingerprint already stored");
            return Ok(InsertOutcome::Conflict);
        }
        state.push(record).map(InsertOutcome::Created)
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> AttestResult<AuditRecord> {
        let state = self.state()?;
        state
            .by_fingerprint
            .get(fingerprint)
            .and_then(|seq| self.live_by_seq(&state, *seq, Utc::now()))
            .ok_or_else(|| AttestError::not_found(format!("audit record with fingerprint {fingerprint}")))
    }

    async fn get(&self, id: &str) -> AttestResult<AuditRecord> {
        let state = self.state()?;
        state
            .by_id
            .get(id)
            .and_then(|seq| self.live_by_seq(&state, *seq, Utc::now()))
            .ok_or_else(|| AttestError::not_found(format!("audit record {id}")))
    }

    async fn last_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> AttestResult<AuditRecord> {
        let state = self.state()?;
        let now = Utc::now();
        let key = ResourceKey::new(resource_type, resource_id);

        state
            .by_resource
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|seq| self.live_by_seq(&state, *seq, now).map(|r| (*seq, r)))
            .max_by(|(a_seq, a), (b_seq, b)| a.created_at.cmp(&b.created_at).then(a_seq.cmp(b_seq)))
            .map(|(_, record)| record)
            .ok_or_else(|| AttestError::not_found(format!("last audit record for {key}")))
    }

    async fn list(&self, filter: &ListFilter) -> AttestResult<Vec<AuditRecord>> {
        let filter = filter.clone().normalized();
        let state = self.state()?;
        let now = Utc::now();

        let mut matched: Vec<(&u64, &AuditRecord)> = state
            .records
            .iter()
            .filter(|(_, r)| self.is_live(r, now) && filter.matches(r))
            .collect();
        matched.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at.cmp(&a.created_at).then(b_seq.cmp(a_seq))
        });

        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit).unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn ping(&self) -> AttestResult<()> {
        self.state().map(|_| ())
    }
}
