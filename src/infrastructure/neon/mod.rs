//! Neon control-plane adapter (reqwest over HTTPS, bearer auth).

pub mod client;
pub mod types;

pub use client::{NeonClient, NeonClientConfig};
