//! Idempotent create resolution.
//!
//! A client may attach an idempotency token to a create. The token is hashed
//! into a fingerprint that the store keeps unique, so retries of the same
//! logical write collapse onto the first stored record.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;

use attest_contracts::{AttestError, AttestResult, AuditRecord};

use crate::cancel::CallGuard;
use crate::traits::{AuditStore, InsertOutcome};

/// Default wait before re-reading a conflicting fingerprint.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Hash an idempotency token into its fingerprint.
///
/// Absent or empty tokens give an empty fingerprint, which disables
/// deduplication for that request.
pub fn fingerprint(token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => hex::encode(Sha256::digest(token.as_bytes())),
        _ => String::new(),
    }
}

/// What the store ended up holding for a create.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: AuditRecord,
    /// False when an earlier write with the same fingerprint won.
    pub created: bool,
}

/// Arbitrates duplicate inserts by fingerprint.
#[derive(Debug, Clone)]
pub struct IdempotencyResolver {
    retry_delay: Duration,
}

impl Default for IdempotencyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl IdempotencyResolver {
    pub fn new(retry_delay: Duration) -> Self {
        Self { retry_delay }
    }

    /// Insert `record`, or return the record already stored under its
    /// fingerprint.
    ///
    /// On a uniqueness conflict the winner is read back. If that read misses
    /// because the winner's write is not visible yet, it is retried exactly
    /// once after `retry_delay`; a second miss is `TransientConflict`.
    pub async fn resolve(
        &self,
        store: &dyn AuditStore,
        guard: &CallGuard<'_>,
        record: AuditRecord,
    ) -> AttestResult<Resolution> {
        if record.idem_fingerprint.is_empty() {
            let stored = guard.run(store.insert(record)).await?;
            return Ok(Resolution {
                record: stored,
                created: true,
            });
        }

        let fingerprint = record.idem_fingerprint.clone();
        match guard.run(store.insert_idempotent(record)).await? {
            InsertOutcome::Created(stored) => Ok(Resolution {
                record: stored,
                created: true,
            }),
            InsertOutcome::Conflict => {
                let existing = self.read_winner(store, guard, &fingerprint).await?;
                Ok(Resolution {
                    record: existing,
                    created: false,
                })
            }
        }
    }

    async fn read_winner(
        &self,
        store: &dyn AuditStore,
        guard: &CallGuard<'_>,
        fingerprint: &str,
    ) -> AttestResult<AuditRecord> {
        match guard.run(store.find_by_fingerprint(fingerprint)).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }

        debug!(
            fingerprint = %fingerprint,
            delay_ms = self.retry_delay.as_millis() as u64,
            "conflicting record not visible yet, retrying read once"
        );
        guard.pause(self.retry_delay).await?;

        match guard.run(store.find_by_fingerprint(fingerprint)).await {
            Err(e) if e.is_not_found() => Err(AttestError::TransientConflict {
                fingerprint: fingerprint.to_string(),
            }),
            other => other,
        }
    }
}
