//! Telemetry bootstrap for replication services.
//!
//! Provides tracing initialization with environment-appropriate output: pretty
//! console logging in development, JSON rolling files in production.

pub mod tracing;

pub use crate::tracing::{LogFlusher, TracingError, init_test_tracing, init_tracing};
