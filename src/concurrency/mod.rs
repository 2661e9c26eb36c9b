//! Concurrency control
//!
//! Registry hosts are protected by a per-host admission gate; there is no
//! global task limit. Fan-out inside the replication pipeline is expressed
//! with joined futures, so the only state shared between concurrent calls is
//! the gate of the host they target.

pub mod admission;

pub use admission::{AdmissionGate, AdmissionGuard, AdmissionStats};
