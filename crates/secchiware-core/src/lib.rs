// crates/secchiware-core/src/lib.rs
// ============================================================================
// Module: Secchiware Core Library
// Description: Control-plane data model, signing scheme, and interface traits.
// Purpose: Shared types for the Secchiware C2 and Node services.
// Dependencies: serde, serde_json, sha2, hmac, subtle, base64, time, thiserror
// ============================================================================

//! ## Overview
//! Secchiware Core defines the wire-level data model shared by the C2 and
//! Node services: canonical dotted names, the recursive package tree, test
//! reports, session records, execution selectors, and the platform
//! fingerprint. It also implements the `SECCHIWARE-HMAC-256` request signing
//! scheme and the backend-agnostic broker and store interfaces.
//! Invariants:
//! - Wire types serialize identically on both ends of every connection.
//! - The canonical signing string is a pure function of its inputs.
//! - Interface implementations fail closed on missing or invalid data.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod signing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::identifiers::CanonicalName;
pub use core::identifiers::EnvironmentEndpoint;
pub use core::identifiers::KeyId;
pub use core::identifiers::NameError;
pub use core::identifiers::is_identifier;
pub use core::packages::ModuleInfo;
pub use core::packages::PackageInfo;
pub use core::packages::TestInfo;
pub use core::packages::TestSetInfo;
pub use core::packages::collect_test_names;
pub use core::platform::OsInfo;
pub use core::platform::PlatformInfo;
pub use core::platform::RuntimeInfo;
pub use core::report::RESULT_FAILED;
pub use core::report::RESULT_INCONCLUSIVE;
pub use core::report::RESULT_PASSED;
pub use core::report::TestReport;
pub use core::selector::ExecutionSelector;
pub use core::selector::SelectorError;
pub use core::selector::parse_query_pairs;
pub use core::session::ActiveEnvironment;
pub use core::session::Arrange;
pub use core::session::ExecutionDetail;
pub use core::session::ExecutionOrder;
pub use core::session::ExecutionQuery;
pub use core::session::ExecutionRecord;
pub use core::session::RegistrationRequest;
pub use core::session::ReportRecord;
pub use core::session::SessionDetail;
pub use core::session::SessionOrder;
pub use core::session::SessionQuery;
pub use core::session::SessionRecord;
pub use core::time::TimeError;
pub use core::time::Timestamp;
pub use interfaces::BrokerError;
pub use interfaces::CacheBroker;
pub use interfaces::FencingToken;
pub use interfaces::SessionStore;
pub use interfaces::StoreError;
