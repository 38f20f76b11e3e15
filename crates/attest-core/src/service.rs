//! The audit ingestion service.
//!
//! Create pipeline, per request:
//!
//!   Validate → LastByResource → Chain link → Idempotency resolve → Store
//!
//! The read of the resource's last record and the write of the new record
//! are two separate storage calls. Two creates for the same resource that
//! interleave between them both link to the same predecessor and fork the
//! chain. Forks are left in place and show up in `attest_chain::find_forks`;
//! nothing here serializes writers per resource.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use attest_chain::{build_link, LinkFields};
use attest_contracts::{
    new_record_id, AttestError, AttestResult, AuditRecord, CreateAuditRequest, ListFilter,
};

use crate::cancel::CallGuard;
use crate::idempotency::{fingerprint, IdempotencyResolver, DEFAULT_RETRY_DELAY};
use crate::traits::AuditStore;

/// Tunables for `AuditService`.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Upper bound on each individual storage call. `None` leaves timing
    /// entirely to the caller's cancellation token.
    pub storage_timeout: Option<Duration>,
    /// Wait before the single re-read of a conflicting fingerprint.
    pub idempotency_retry_delay: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            storage_timeout: None,
            idempotency_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Validates, links and stores audit records; answers lookups and lists.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    resolver: IdempotencyResolver,
    storage_timeout: Option<Duration>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_options(store, ServiceOptions::default())
    }

    pub fn with_options(store: Arc<dyn AuditStore>, options: ServiceOptions) -> Self {
        Self {
            store,
            resolver: IdempotencyResolver::new(options.idempotency_retry_delay),
            storage_timeout: options.storage_timeout,
        }
    }

    fn guard<'a>(&self, cancel: &'a CancellationToken) -> CallGuard<'a> {
        CallGuard::new(cancel, self.storage_timeout)
    }

    /// Create one audit record.
    ///
    /// # Errors
    ///
    /// - `Validation` when `actorId`, `action`, `resourceId` or
    ///   `resourceType` is empty; nothing is written.
    /// - `Cancelled` when `cancel` fires or a storage deadline elapses.
    /// - `TransientConflict` when an idempotent duplicate could not be read
    ///   back.
    /// - Storage errors other than a missing predecessor, unchanged.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        request: CreateAuditRequest,
    ) -> AttestResult<AuditRecord> {
        if let Some(field) = request.missing_field() {
            debug!(field, "rejecting audit create with missing field");
            return Err(AttestError::Validation {
                field: field.to_string(),
            });
        }

        let guard = self.guard(cancel);
        guard.check()?;

        let created_at = Utc::now();
        let id = new_record_id();

        let last_hash = match guard
            .run(self.store.last_by_resource(&request.resource_type, &request.resource_id))
            .await
        {
            Ok(last) => last.chain_hash,
            Err(e) if e.is_not_found() => String::new(),
            Err(e) => return Err(e),
        };

        let link = build_link(
            &last_hash,
            &LinkFields {
                actor_id: &request.actor_id,
                actor_type: &request.actor_type,
                action: &request.action,
                resource_id: &request.resource_id,
                resource_type: &request.resource_type,
                created_at,
            },
        )?;

        let record = AuditRecord {
            id,
            idem_fingerprint: fingerprint(request.idempotency_key.as_deref()),
            actor_id: request.actor_id,
            actor_type: request.actor_type,
            action: request.action,
            resource_id: request.resource_id,
            resource_type: request.resource_type,
            ip: request.ip,
            user_agent: request.user_agent,
            metadata: request.metadata,
            created_at,
            chain_prev: link.chain_prev,
            chain_hash: link.chain_hash,
        };

        let resolution = self.resolver.resolve(self.store.as_ref(), &guard, record).await?;
        let stored = resolution.record;

        if resolution.created {
            info!(
                record_id = %stored.id,
                resource = %stored.resource(),
                action = %stored.action,
                chain_head = stored.is_chain_head(),
                "audit record created"
            );
        } else {
            info!(
                record_id = %stored.id,
                resource = %stored.resource(),
                "idempotent retry matched existing audit record"
            );
        }

        Ok(stored)
    }

    /// Create each request independently, in order.
    ///
    /// The result has one entry per request at the same position. A failed
    /// item never affects its siblings.
    pub async fn create_batch(
        &self,
        cancel: &CancellationToken,
        requests: Vec<CreateAuditRequest>,
    ) -> Vec<AttestResult<AuditRecord>> {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        for request in requests {
            results.push(self.create(cancel, request).await);
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(total, failed, "audit batch processed");
        results
    }

    /// Fetch a record by id.
    pub async fn get(&self, cancel: &CancellationToken, id: &str) -> AttestResult<AuditRecord> {
        self.guard(cancel).run(self.store.get(id)).await
    }

    /// List records, newest first, after normalizing paging.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        filter: ListFilter,
    ) -> AttestResult<Vec<AuditRecord>> {
        let filter = filter.normalized();
        let mut records = self.guard(cancel).run(self.store.list(&filter)).await?;

        // The page size is a hard ceiling no matter what the store returned.
        let limit = usize::try_from(filter.limit).unwrap_or(usize::MAX);
        records.truncate(limit);

        debug!(
            returned = records.len(),
            limit = filter.limit,
            offset = filter.offset,
            "audit records listed"
        );
        Ok(records)
    }

    /// Check the store is reachable.
    pub async fn ping(&self, cancel: &CancellationToken) -> AttestResult<()> {
        self.guard(cancel).run(self.store.ping()).await
    }
}
