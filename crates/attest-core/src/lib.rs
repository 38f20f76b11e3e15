//! # attest-core
//!
//! The tamper-evident audit ingestion pipeline.
//!
//! This crate provides:
//! - The `AuditStore` trait, the only way the core reaches persistence
//! - `AuditService`, which validates, chain-links, deduplicates and stores
//! - `IdempotencyResolver` and the `fingerprint` function
//! - `AdmissionGate`, which rate-limits callers in front of the service
//!
//! ## Usage
//!
//! ```rust,ignore
//! use attest_core::{AdmissionGate, AuditService};
//!
//! let service = AuditService::new(store);
//! let gate = AdmissionGate::new(limiter, service);
//! let record = gate.create("10.0.0.7:51234", &cancel, request).await?;
//! ```

pub mod cancel;
pub mod gate;
pub mod idempotency;
pub mod service;
pub mod traits;

pub use cancel::CallGuard;
pub use gate::AdmissionGate;
pub use idempotency::{fingerprint, IdempotencyResolver, Resolution};
pub use service::{AuditService, ServiceOptions};
pub use traits::{AuditStore, InsertOutcome};

// ── Tests ─────────────────────────────────────────────────────────────────────
