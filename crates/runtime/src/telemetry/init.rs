//! Tracing subscriber setup with optional OTLP span export.

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, Resource};
use tracing::{field, info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::inflight::WorkerId;

/// Initialise the global tracing subscriber.
///
/// Configures:
/// - A JSON-formatted [`tracing_subscriber`] layer for structured log output.
///   Each line carries the fields of its innermost span, so events logged
///   while a message is being delivered include its worker id and length.
/// - When `otlp_endpoint` is set, a [`tracing_opentelemetry`] layer that
///   exports spans to that endpoint.
///
/// `RUST_LOG` takes precedence over `log_level`.
///
/// # Errors
///
/// Returns an error if the OTLP pipeline cannot be installed or a subscriber
/// is already set.
pub fn init_telemetry(otlp_endpoint: Option<&str>, log_level: &str) -> Result<()> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(
                    opentelemetry_sdk::trace::Config::default().with_resource(service_resource()),
                )
                .install_batch(runtime::Tokio)
                .context("failed to install OTLP tracing pipeline")?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .with(otel_layer)
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(())
}

/// Span covering the delivery of one message.
///
/// `len` is recorded once the body has been read. The body itself is never
/// attached.
pub fn message_span(worker: WorkerId) -> Span {
    info_span!("message", worker = %worker, len = field::Empty)
}

/// Flush and shut down the global tracer provider.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}

fn service_resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            "dataflow-runtime",
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::PROCESS_PID,
            i64::from(std::process::id()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflight::InFlightSet;

    #[test]
    fn message_span_carries_worker_and_length_only() {
        let set = InFlightSet::new();
        let guard = set.register();
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = message_span(guard.id());
            let meta = span.metadata().expect("span is enabled");
            assert_eq!(meta.name(), "message");
            let fields: Vec<_> = meta.fields().iter().map(|f| f.name()).collect();
            assert_eq!(fields, ["worker", "len"]);
            span.record("len", 3_usize);
        });
    }

    #[test]
    fn resource_names_the_service_and_process() {
        let resource = service_resource();
        let name = resource.get(opentelemetry::Key::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        ));
        assert_eq!(name.map(|v| v.to_string()).as_deref(), Some("dataflow-runtime"));
        let pid = resource.get(opentelemetry::Key::new(
            opentelemetry_semantic_conventions::resource::PROCESS_PID,
        ));
        assert_eq!(
            pid.map(|v| v.to_string()),
            Some(std::process::id().to_string())
        );
    }
}
