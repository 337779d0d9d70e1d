//! Port interfaces
//!
//! Traits for the collaborators the orchestrator does not own:
//! - `BranchingApi`: the branching control plane
//! - `SuiteHooks`: the test runner's before-all / after-all registration
//! - `ConnectionFactory` / `RealtimeConnection`: real-time connection construction

pub mod branching_api;
pub mod connection;
pub mod suite_hooks;

pub use branching_api::BranchingApi;
pub use connection::{ConnectionFactory, RealtimeConnection};
pub use suite_hooks::{HookFuture, SuiteHook, SuiteHooks};
