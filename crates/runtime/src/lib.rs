//! `dataflow-runtime` — HTTP shim between the dataflow sidecar and a message handler.
//!
//! The runtime listens on a local address, hands every `POST /messages` body
//! to a [`Handler`], and returns the handler's reply. On SIGTERM/SIGINT it
//! waits for every in-flight message to finish before closing the listener.
//!
//! Startup sequence ([`start`]):
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Build the Tokio runtime with a bounded blocking pool for handlers.
//! 3. Initialise telemetry.
//! 4. Bind the listener and serve until the shutdown trigger has drained.

pub mod config;
pub mod inflight;
pub mod server;
pub mod shutdown;
pub mod telemetry;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use common::{from_fn, Context as MessageContext, EchoHandler, Handler, HandlerError, HandlerResult};
pub use config::Config;
pub use server::state::AppState;

/// Run `handler` behind the HTTP shim until the process is asked to stop.
///
/// Blocks the calling thread. Intended to be called from a plain `fn main`.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the runtime cannot be
/// built, or the server fails.
pub fn start(handler: impl Handler) -> Result<()> {
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(cfg.max_workers)
        .build()
        .context("failed to build Tokio runtime")?;

    runtime.block_on(run(cfg, handler))
}

/// Async variant of [`start`] for callers that already own a runtime.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialised, the listener cannot
/// be bound, or the server fails.
pub async fn run(cfg: Config, handler: impl Handler) -> Result<()> {
    telemetry::init_telemetry(cfg.otlp_endpoint(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        bind_addr = %cfg.bind_addr,
        max_workers = cfg.max_workers,
        "dataflow-runtime starting"
    );

    let addr = cfg.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let token = CancellationToken::new();
    let _signals = shutdown::trigger_on_signal(token.clone());

    let result = server::serve(listener, AppState::new(handler), token).await;
    telemetry::shutdown_telemetry();
    result
}
