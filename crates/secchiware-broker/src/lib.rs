// crates/secchiware-broker/src/lib.rs
// ============================================================================
// Module: Secchiware Broker Library
// Description: In-memory implementation of the shared cache/lock broker.
// Purpose: Provide active-node storage, replay counters, and named mutexes.
// Dependencies: secchiware-core, serde_json
// ============================================================================

//! ## Overview
//! Secchiware Broker ships the in-process [`MemoryBroker`] implementation of
//! [`secchiware_core::CacheBroker`]. It backs single-process deployments and
//! every test suite; multi-process deployments substitute an external store
//! with the same atomic semantics.
//! Invariants:
//! - Expired entries are never observable through any read path.
//! - Fencing tokens increase monotonically per mutex name.
//! - `incr` returns 1 for the first observation of a key within its window.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use memory::MemoryBroker;

#[cfg(test)]
mod tests;
