//! Orchestration services: the branch lifecycle and everything it leans on.

pub mod branch_lifecycle;
pub mod cleanup;
pub mod connection_tracker;
pub mod env_sanitizer;
pub mod error_guard;
pub mod options_resolver;
pub mod suite;

pub use branch_lifecycle::{BranchHandle, NeonTesting};
pub use cleanup::delete_marked_branches;
pub use connection_tracker::ConnectionTracker;
pub use env_sanitizer::{clear_database_url, register_env_sanitizer};
pub use error_guard::{AsyncError, ErrorGuard, ScopeId};
pub use suite::{Suite, SuiteReport, TestOutcome};
