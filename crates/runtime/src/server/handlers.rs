//! Axum request handlers for all service endpoints.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use common::{
    protocol::{ErrorResponse, CONTENT_TYPE_FAILURE, CONTENT_TYPE_MESSAGE},
    Context, Handler, HandlerResult, ServiceError,
};
use tracing::{debug, warn, Instrument, Span};

use super::{body::TrackedBody, state::AppState};
use crate::inflight::{InFlightGuard, WorkerId};
use crate::telemetry;

/// `GET /ready` — liveness probe.
///
/// Always `204 No Content`, whatever the load or lifecycle phase.
pub async fn ready() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `POST /messages` — deliver one message to the handler.
///
/// The request is registered as in flight before its body is read and stays
/// registered until the response body has been written (see [`TrackedBody`]).
///
/// | handler outcome    | response                          |
/// |--------------------|-----------------------------------|
/// | `Ok(Some(bytes))`  | `201 Created`, body = `bytes`     |
/// | `Ok(None)`         | `204 No Content`                  |
/// | `Err(e)`           | `500`, body = `e`'s message       |
/// | panic              | `500`, body = panic message       |
///
/// A body that cannot be read yields `400` and never reaches the handler.
///
/// Once the handler has started, the blocking task owns the registration until
/// the handler returns. A client that disconnects mid-call drops this future,
/// but the worker stays in flight until the handler is done.
pub async fn messages(State(state): State<AppState>, body: Body) -> Response {
    let guard = state.in_flight.register();
    let span = telemetry::message_span(guard.id());
    deliver(Arc::clone(&state.handler), guard, body)
        .instrument(span)
        .await
}

async fn deliver(handler: Arc<dyn Handler>, guard: InFlightGuard, body: Body) -> Response {
    let worker = guard.id();
    let message = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => return respond(worker, Some(guard), Err(ServiceError::BodyRead(e.to_string()))),
    };
    let span = Span::current();
    span.record("len", message.len());
    debug!("message received");

    // The handler is synchronous and may block for as long as it likes.
    let task = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle(&message, &Context::new())
        }))
        .map_err(|payload| ServiceError::HandlerPanicked(panic_text(payload.as_ref())));
        (outcome, guard)
    });

    match task.await {
        Ok((outcome, guard)) => respond(worker, Some(guard), outcome),
        // Only reachable when the runtime shuts down before the task runs; the
        // guard was dropped with the unstarted closure.
        Err(e) => respond(worker, None, Err(ServiceError::HandlerPanicked(e.to_string()))),
    }
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Outcome mapping helpers
// ---------------------------------------------------------------------------

/// Build the response for a handler outcome, moving `guard` into the body.
fn respond(
    worker: WorkerId,
    guard: Option<InFlightGuard>,
    outcome: Result<HandlerResult, ServiceError>,
) -> Response {
    let (status, content_type, body) = match outcome {
        Ok(Ok(Some(reply))) => {
            debug!(%worker, len = reply.len(), "handler replied");
            (StatusCode::CREATED, Some(CONTENT_TYPE_MESSAGE), reply)
        }
        Ok(Ok(None)) => {
            debug!(%worker, "handler returned no content");
            (StatusCode::NO_CONTENT, None, Bytes::new())
        }
        Ok(Err(e)) => failure(worker, ServiceError::Handler(e)),
        Err(e) => failure(worker, e),
    };

    let body = match guard {
        Some(guard) => TrackedBody::new(body, guard),
        None => TrackedBody::untracked(body),
    };
    let mut response = Response::new(Body::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

fn failure(worker: WorkerId, err: ServiceError) -> (StatusCode, Option<&'static str>, Bytes) {
    warn!(%worker, error = %err, "message delivery failed");
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Some(CONTENT_TYPE_FAILURE), Bytes::from(err.body_text()))
}

/// Extract a printable message from a caught panic payload.
fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
