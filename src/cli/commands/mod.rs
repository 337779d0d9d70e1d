//! CLI command implementations.

pub mod cleanup;
pub mod list;
