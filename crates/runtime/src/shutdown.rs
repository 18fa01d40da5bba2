//! Shutdown triggering and drain coordination.
//!
//! A [`CancellationToken`] is the single shutdown trigger. It is cancelled by
//! SIGTERM/SIGINT (see [`trigger_on_signal`]) or directly by embedding code.
//! [`drain`] resolves once the token is cancelled *and* every in-flight
//! request has finished; the server closes its listener only then.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::server::state::{AppState, Phase};

/// Cancel `token` when the process receives SIGTERM or SIGINT.
pub fn trigger_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_signal() => token.cancel(),
            () = token.cancelled() => {}
        }
    })
}

/// Wait for the shutdown trigger, then for all in-flight requests to finish.
///
/// Moves the lifecycle to [`Phase::Draining`] when the trigger fires. There is
/// no timeout: a handler that never returns keeps this pending forever.
pub async fn drain(state: AppState, token: CancellationToken) {
    token.cancelled().await;

    if state.lifecycle.advance(Phase::Draining) {
        info!(
            in_flight = state.in_flight.len(),
            "shutdown triggered, waiting for in-flight messages"
        );
    }
    state.in_flight.wait_idle().await;
    info!("in-flight messages drained, closing listener");
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
