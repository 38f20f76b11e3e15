//! # attest-contracts
//!
//! Shared types and the error taxonomy for the attest audit pipeline.
//!
//! Every crate in the workspace imports from here. No business logic lives in
//! this crate, only record definitions, list filters and error types.

pub mod error;
pub mod filter;
pub mod record;

pub use error::{AttestError, AttestResult, ErrorKind};
pub use filter::{ListFilter, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use record::{new_record_id, AuditRecord, CreateAuditRequest, Metadata, ResourceKey};
