//! Observability setup for todoloop: tracing subscriber and optional
//! OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, init_tracing, shutdown_tracing};
