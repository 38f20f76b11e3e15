//! The storage seam the ingestion service depends on.
//!
//! The core never talks to a database directly. Any persistence layer that
//! implements `AuditStore` can sit behind the service; `attest-store` ships
//! an in-memory reference implementation.

use async_trait::async_trait;

use attest_contracts::{AttestResult, AuditRecord, ListFilter};

/// Result of an insert that must respect fingerprint uniqueness.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The record was new and is now stored.
    Created(AuditRecord),
    /// A record with the same fingerprint already exists; nothing was
    /// written. The existing record may not be readable yet.
    Conflict,
}

/// Persistence capability for audit records.
///
/// Implementations own durable lifetime, including retention: a record past
/// the retention horizon must not be returned by any method.
///
/// Storage failures are reported as `AttestError::StorageUnavailable`;
/// lookup misses as `AttestError::NotFound`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Store a record unconditionally.
    async fn insert(&self, record: AuditRecord) -> AttestResult<AuditRecord>;

    /// Store a record whose `idem_fingerprint` must be unique.
    ///
    /// A uniqueness violation is `Ok(InsertOutcome::Conflict)`, never an
    /// error, so callers can tell it apart from a failed write.
    async fn insert_idempotent(&self, record: AuditRecord) -> AttestResult<InsertOutcome>;

    /// Read the record holding `fingerprint`.
    async fn find_by_fingerprint(&self, fingerprint: &str) -> AttestResult<AuditRecord>;

    /// Point lookup by record id.
    async fn get(&self, id: &str) -> AttestResult<AuditRecord>;

    /// The most recently inserted live record for a resource.
    ///
    /// `NotFound` means the resource has no live records; the next record
    /// starts a new chain.
    async fn last_by_resource(&self, resource_type: &str, resource_id: &str)
        -> AttestResult<AuditRecord>;

    /// Records matching a normalized filter, newest `created_at` first.
    async fn list(&self, filter: &ListFilter) -> AttestResult<Vec<AuditRecord>>;

    /// Liveness probe.
    async fn ping(&self) -> AttestResult<()>;
}
