//! # attest-store
//!
//! Reference `AuditStore` backed by process memory.
//!
//! Suitable for tests, demos and single-process deployments that can afford
//! to lose history on restart. It honors the full storage contract: unique
//! sparse fingerprints, per-resource last-record lookup, filtered listing
//! newest-first, and a retention horizon.

pub mod memory;

pub use memory::MemoryAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
