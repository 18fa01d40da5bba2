//! Axum HTTP server, routing, and request lifecycle.
//!
//! # Responsibilities
//! - Serve the two fixed routes on an already bound listener.
//! - Track every `/messages` request in the shared in-flight set.
//! - On shutdown, keep the listener open until the in-flight set is empty,
//!   then close it and let open connections finish.

pub mod body;
pub mod handlers;
pub mod router;
pub mod state;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::shutdown;
use state::{AppState, Phase};

/// Serve requests on `listener` until `token` is cancelled and every
/// in-flight request has completed.
///
/// # Errors
///
/// Returns an error if the listener address cannot be read or the accept loop
/// fails.
pub async fn serve(listener: TcpListener, state: AppState, token: CancellationToken) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    let app = router::build(state.clone());

    state.lifecycle.advance(Phase::Running);
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::drain(state.clone(), token))
        .await
        .context("HTTP server failed")?;

    state.lifecycle.advance(Phase::Stopped);
    info!("server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::{from_fn, Context as MessageContext};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Send one request over a fresh connection and return `(status, body)`.
    async fn send(addr: SocketAddr, method: &str, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "{method} {path} HTTP/1.1\r\nhost: {addr}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has a header block");
        let head = String::from_utf8_lossy(&raw[..split]).into_owned();
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status line");
        (status, raw[split + 4..].to_vec())
    }

    /// Open a connection and write a `POST /messages` head announcing
    /// `content_length` bytes, followed by `sent`. Nothing is read back.
    async fn open_message(addr: SocketAddr, content_length: usize, sent: &[u8]) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "POST /messages HTTP/1.1\r\nhost: {addr}\r\ncontent-length: {content_length}\r\n\r\n"
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(sent).await.unwrap();
        stream
    }

    async fn start(state: AppState) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(serve(listener, state, token.clone()));
        (addr, token, task)
    }

    async fn wait_for_phase(state: &AppState, phase: Phase) {
        let mut phases = state.lifecycle.subscribe();
        tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p >= phase))
            .await
            .expect("phase should be reached")
            .unwrap();
    }

    async fn wait_for_in_flight(state: &AppState, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.in_flight.len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("requests should become in flight");
    }

    async fn wait_for_idle(state: &AppState) {
        tokio::time::timeout(Duration::from_secs(5), state.in_flight.wait_idle())
            .await
            .expect("in-flight set should drain");
    }

    #[tokio::test]
    async fn serves_both_routes_over_tcp() {
        let state = AppState::default();
        let (addr, token, task) = start(state.clone()).await;

        let (status, body) = send(addr, "GET", "/ready", b"").await;
        assert_eq!(status, 204);
        assert!(body.is_empty());

        let (status, body) = send(addr, "POST", "/messages", b"world").await;
        assert_eq!(status, 201);
        assert_eq!(body, b"hi! world");
        assert!(state.in_flight.is_empty());

        token.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(state.lifecycle.current(), Phase::Stopped);
    }

    #[tokio::test]
    async fn idle_server_stops_promptly() {
        let state = AppState::default();
        let (addr, token, task) = start(state.clone()).await;
        wait_for_phase(&state, Phase::Running).await;
        assert_eq!(state.lifecycle.current(), Phase::Running);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("idle server should stop")
            .unwrap()
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn listener_stays_open_until_in_flight_requests_finish() {
        let state = AppState::new(from_fn(|msg: &[u8], _: &MessageContext| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Some(Bytes::copy_from_slice(msg)))
        }));
        let (addr, token, task) = start(state.clone()).await;

        let requests: Vec<_> = ["one", "two", "three"]
            .into_iter()
            .map(|body| tokio::spawn(async move { send(addr, "POST", "/messages", body.as_bytes()).await }))
            .collect();
        wait_for_in_flight(&state, 3).await;

        token.cancel();
        wait_for_phase(&state, Phase::Draining).await;
        assert!(!task.is_finished());

        // Still connectable while draining; readiness still answers.
        let (status, _) = send(addr, "GET", "/ready", b"").await;
        assert_eq!(status, 204);

        for (req, expected) in requests.into_iter().zip(["one", "two", "three"]) {
            let (status, body) = req.await.unwrap();
            assert_eq!(status, 201);
            assert_eq!(body, expected.as_bytes());
        }

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server should stop once drained")
            .unwrap()
            .unwrap();
        assert!(state.in_flight.is_empty());
        assert_eq!(state.lifecycle.current(), Phase::Stopped);
        assert!(
            TcpStream::connect(addr).await.is_err(),
            "listener is closed after the drain"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn client_disconnect_mid_handler_still_blocks_shutdown() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_flag, finished_flag) = (Arc::clone(&started), Arc::clone(&finished));
        let state = AppState::new(from_fn(move |_: &[u8], _: &MessageContext| {
            started_flag.store(true, Ordering::SeqCst);
            let _ = release_rx.lock().unwrap().recv();
            finished_flag.store(true, Ordering::SeqCst);
            Ok(Some(Bytes::from_static(b"nobody is listening")))
        }));
        let (addr, token, task) = start(state.clone()).await;

        let stream = open_message(addr, 4, b"wait").await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !started.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler should start");

        drop(stream);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.in_flight.len(), 1, "handler is still running");

        token.cancel();
        wait_for_phase(&state, Phase::Draining).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished(), "drain waits for the abandoned handler");
        assert!(TcpStream::connect(addr).await.is_ok(), "listener still open");
        assert_eq!(state.lifecycle.current(), Phase::Draining);

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server should stop once the handler returns")
            .unwrap()
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(state.in_flight.is_empty());
        assert_eq!(state.lifecycle.current(), Phase::Stopped);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn truncated_body_is_released_without_calling_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let state = AppState::new(from_fn(move |_: &[u8], _: &MessageContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }));
        let (addr, token, task) = start(state.clone()).await;

        let stream = open_message(addr, 100, b"0123456789").await;
        wait_for_in_flight(&state, 1).await;
        assert_eq!(state.in_flight.len(), 1, "registered while the body is pending");

        drop(stream);
        wait_for_idle(&state).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // The failed read leaves the server healthy.
        let (status, _) = send(addr, "POST", "/messages", b"whole").await;
        assert_eq!(status, 204);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        token.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(state.lifecycle.current(), Phase::Stopped);
    }

    #[tokio::test]
    async fn stuck_handler_blocks_shutdown() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let state = AppState::new(from_fn(move |_: &[u8], _: &MessageContext| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(None)
        }));
        let (addr, token, task) = start(state.clone()).await;

        let request = tokio::spawn(async move { send(addr, "POST", "/messages", b"wait").await });
        wait_for_in_flight(&state, 1).await;

        token.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished(), "no shutdown timeout");
        assert!(TcpStream::connect(addr).await.is_ok());

        release_tx.send(()).unwrap();
        let (status, _) = request.await.unwrap();
        assert_eq!(status, 204);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server should stop once released")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn independent_servers_do_not_share_state() {
        let first = AppState::default();
        let second = AppState::default();
        let (_, first_token, first_task) = start(first.clone()).await;
        let (second_addr, second_token, second_task) = start(second.clone()).await;

        let busy = first.in_flight.register();
        first_token.cancel();
        wait_for_phase(&first, Phase::Draining).await;

        let (status, _) = send(second_addr, "POST", "/messages", b"x").await;
        assert_eq!(status, 201);
        second_token.cancel();
        second_task.await.unwrap().unwrap();
        assert_eq!(second.lifecycle.current(), Phase::Stopped);
        assert_eq!(first.lifecycle.current(), Phase::Draining);

        drop(busy);
        first_task.await.unwrap().unwrap();
    }
}
