//! # Weft server
//!
//! The runnable half of the Weft runtime: configuration loading, logging
//! setup, and the built-in service modules the bootstrap launches (logger,
//! transport stub, echo). The binary in `main.rs` wires these together;
//! everything here is a library so tests can drive the same paths.

/// Config-file loading and environment-store seeding
pub mod config;

/// Built-in service modules
pub mod services;

/// Bootstrap sequence shared by the binary and the tests
pub mod bootstrap;

pub use bootstrap::bootstrap;
pub use config::{ConfigError, RuntimeConfig};
