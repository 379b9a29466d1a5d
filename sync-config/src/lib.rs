//! Configuration management for replication services.
//!
//! Provides environment detection, configuration loading from YAML files and
//! environment variables, and shared configuration types for the replication
//! pipeline.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
