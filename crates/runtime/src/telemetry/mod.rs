//! Logging and tracing setup.
//!
//! Structured JSON logs go to stdout. Span export over OTLP is switched on by
//! setting `OTEL_EXPORTER_OTLP_ENDPOINT`.
//!
//! # Telemetry invariants
//!
//! - Message bodies never appear in any span attribute or log field; only
//!   their length is recorded.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::{init_telemetry, message_span, shutdown_telemetry};
