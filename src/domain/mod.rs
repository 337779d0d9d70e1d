//! Domain layer: pure types and the traits at every external seam.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{
    ApiError, ConfigError, ConnectionError, LifecycleError, NeonTestingError, NeonTestingResult,
};
