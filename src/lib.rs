//! neon-testing - Ephemeral Neon branches for integration test suites
//!
//! Every test suite gets its own copy-on-write branch of a Neon project. A
//! before-all hook creates the branch and publishes its connection string in
//! `DATABASE_URL`; an after-all hook drains open WebSocket connections and
//! deletes the branch, even when tests failed.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Errors, models, and ports (traits at every external seam)
//! - **Service Layer** (`services`): Lifecycle controller, connection tracking, error guard
//! - **Infrastructure Layer** (`infrastructure`): Neon HTTP client, WebSocket connector, config, logging
//! - **CLI Layer** (`cli`): Out-of-band maintenance commands
//!
//! # Example
//!
//! ```no_run
//! use neon_testing::{ConfigLoader, NeonTesting, Suite};
//!
//! // inside a #[tokio::test]
//! async fn users_table() -> anyhow::Result<()> {
//!     let neon = NeonTesting::new(ConfigLoader::load()?)?;
//!     let mut suite = Suite::new("users");
//!     let branch = neon.activate(&mut suite, None)?;
//!
//!     suite
//!         .run(|| async move {
//!             let url = std::env::var("DATABASE_URL")?;
//!             assert_eq!(url, branch.get()?.connection_uri);
//!             Ok(())
//!         })
//!         .await
//!         .into_result()
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{
    ApiError, ConfigError, ConnectionError, LifecycleError, NeonTestingError, NeonTestingResult,
};
pub use domain::models::{
    Branch, BranchInit, BranchRecord, EndpointKind, Expiry, NeonTestingOptions, RetryConfig,
    SuiteOverrides,
};
pub use domain::ports::{BranchingApi, ConnectionFactory, RealtimeConnection, SuiteHooks};
pub use infrastructure::config::ConfigLoader;
pub use infrastructure::logging::init_test_logging;
pub use infrastructure::{NeonClient, RetryPolicy, WebSocketConnector};
pub use services::{
    clear_database_url, register_env_sanitizer, BranchHandle, NeonTesting, Suite, SuiteReport,
};
