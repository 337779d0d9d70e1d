//! Error types for the neon-testing orchestrator.

use thiserror::Error;

/// Maximum branch lifetime accepted by the branching service (30 days).
pub const MAX_EXPIRY_SECONDS: u32 = 2_592_000;

/// Invalid or missing configuration.
///
/// Raised before any network call is made, except for the role/database
/// variants which can only be checked against a creation response.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing required option `{0}`")]
    MissingField(&'static str),

    #[error("Invalid expires_in: {0}. Value must be an integer number of seconds")]
    ExpiryNotInteger(f64),

    #[error("Invalid expires_in: {0}. Value must be positive")]
    ExpiryNotPositive(f64),

    #[error("Invalid expires_in: {0}. Value must not exceed 30 days ({MAX_EXPIRY_SECONDS} seconds)")]
    ExpiryTooLong(f64),

    #[error("Invalid retry policy: {0} must be a positive integer")]
    InvalidRetryPolicy(&'static str),

    #[error("Role `{0}` not found on the created branch")]
    RoleNotFound(String),

    #[error("Database `{0}` not found on the created branch")]
    DatabaseNotFound(String),

    #[error("The created branch has no roles")]
    NoRoles,

    #[error("The created branch has no databases")]
    NoDatabases,

    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Errors returned by the branching control-plane API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The service answered with a non-success status.
    #[error("Neon API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode Neon API response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status code used by the service for "resource temporarily locked".
    pub const LOCKED: u16 = 423;

    /// Returns true for the one transient signal worth retrying.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == Self::LOCKED)
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Lifecycle invariant violations. These indicate misuse, not service trouble.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Branch is not available yet: the before-all hook has not completed")]
    BranchNotReady,

    #[error("Branch {0} is no longer available: it was torn down")]
    BranchUnavailable(String),

    #[error("Branch {0} is still live for this activation; tear it down before creating another")]
    BranchAlreadyLive(String),

    #[error("No branch was created in this activation, nothing to delete")]
    NoLiveBranch,

    /// Background errors raised by this activation's connections that
    /// nothing handled.
    #[error("Unhandled background error: {}", .0.join("; "))]
    UnhandledBackground(Vec<String>),
}

/// Errors from opening or closing real-time connections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Connection error: {0}")]
    Io(String),

    #[error("Connection is closed")]
    Closed,
}

/// Umbrella error returned by lifecycle hooks and orchestrator operations.
#[derive(Debug, Error)]
pub enum NeonTestingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Result alias used across the crate.
pub type NeonTestingResult<T> = Result<T, NeonTestingError>;
