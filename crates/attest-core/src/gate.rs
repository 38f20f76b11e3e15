//! Admission control in front of the ingestion service.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use attest_contracts::{AttestError, AttestResult, AuditRecord, CreateAuditRequest, ListFilter};
use attest_ratelimit::{client_key, RateLimiter};

use crate::service::AuditService;

/// Rate-limits each caller by remote address before any service work.
///
/// A batch is one admission, the same as one request carrying it.
#[derive(Clone)]
pub struct AdmissionGate {
    limiter: Arc<RateLimiter>,
    service: AuditService,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<RateLimiter>, service: AuditService) -> Self {
        Self { limiter, service }
    }

    pub fn service(&self) -> &AuditService {
        &self.service
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn admit(&self, remote_addr: &str) -> AttestResult<()> {
        let key = client_key(remote_addr);
        if self.limiter.allow(&key) {
            return Ok(());
        }
        warn!(client = %key, "request rejected by rate limiter");
        Err(AttestError::RateLimited { key })
    }

    pub async fn create(
        &self,
        remote_addr: &str,
        cancel: &CancellationToken,
        request: CreateAuditRequest,
    ) -> AttestResult<AuditRecord> {
        self.admit(remote_addr)?;
        self.service.create(cancel, request).await
    }

    pub async fn create_batch(
        &self,
        remote_addr: &str,
        cancel: &CancellationToken,
        requests: Vec<CreateAuditRequest>,
    ) -> AttestResult<Vec<AttestResult<AuditRecord>>> {
        self.admit(remote_addr)?;
        Ok(self.service.create_batch(cancel, requests).await)
    }

    pub async fn get(
        &self,
        remote_addr: &str,
        cancel: &CancellationToken,
        id: &str,
    ) -> AttestResult<AuditRecord> {
        self.admit(remote_addr)?;
        self.service.get(cancel, id).await
    }

    pub async fn list(
        &self,
        remote_addr: &str,
        cancel: &CancellationToken,
        filter: ListFilter,
    ) -> AttestResult<Vec<AuditRecord>> {
        self.admit(remote_addr)?;
        self.service.list(cancel, filter).await
    }
}
