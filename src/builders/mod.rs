//! Builders
//!
//! Fluent builder for per-provider bridge configuration.

pub mod config;

pub use config::{bridge_config, BridgeConfigBuilder};
