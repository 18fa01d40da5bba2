//! Response body that keeps its request registered as in flight.
//!
//! Axum handlers return before the response is written to the socket. To keep
//! a request tracked until its body has actually been sent, the
//! [`InFlightGuard`] is moved into the body and released when hyper drops it:
//! after the last frame is written, or when the connection fails mid-write.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::Full;

use crate::inflight::InFlightGuard;

/// A complete in-memory body bound to an in-flight registration.
#[derive(Debug)]
pub struct TrackedBody {
    inner: Full<Bytes>,
    _guard: Option<InFlightGuard>,
}

impl TrackedBody {
    pub fn new(data: Bytes, guard: InFlightGuard) -> Self {
        Self {
            inner: Full::new(data),
            _guard: Some(guard),
        }
    }

    /// A body whose registration has already been released elsewhere.
    pub fn untracked(data: Bytes) -> Self {
        Self {
            inner: Full::new(data),
            _guard: None,
        }
    }
}

impl HttpBody for TrackedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
