//! HTTP surface shared by the runtime and anything that talks to it.
//!
//! The sidecar delivering messages posts raw bytes to [`MESSAGES_PATH`] and
//! probes [`READY_PATH`] before sending the first one.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Liveness probe. Always answers `204 No Content`.
pub const READY_PATH: &str = "/ready";

/// Message delivery endpoint. The request body is the raw message.
pub const MESSAGES_PATH: &str = "/messages";

/// Default listen address: loopback, fixed port.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// Content type of a handler reply.
pub const CONTENT_TYPE_MESSAGE: &str = "application/octet-stream";

/// Content type of a handler failure body.
pub const CONTENT_TYPE_FAILURE: &str = "text/plain; charset=utf-8";

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// JSON body returned for requests outside the two fixed routes.
///
/// Handler failures are *not* wrapped in this type; their message is returned
/// as plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("not_found", "no such route");
        assert_eq!(e.code, "not_found");
        assert!(e.message.contains("no such route"));
    }

    #[test]
    fn error_response_json_shape() {
        let e = ErrorResponse::new("bad_request", "truncated body");
        let v: serde_json::Value = serde_json::to_value(&e).unwrap();
        assert_eq!(v["code"], "bad_request");
        assert_eq!(v["message"], "truncated body");
    }

    #[test]
    fn default_bind_addr_is_loopback() {
        let addr: std::net::SocketAddr = DEFAULT_BIND_ADDR.parse().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8080);
    }
}
