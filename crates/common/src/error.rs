//! Common error types shared across crates.

use thiserror::Error;

use crate::handler::HandlerError;

/// Body sent when a handler fails without any message text.
pub const GENERIC_FAILURE: &str = "handler failed";

/// Failures surfaced while delivering a message.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BodyRead`] → 400
/// - [`ServiceError::Handler`] → 500
/// - [`ServiceError::HandlerPanicked`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body could not be read from the connection.
    #[error("failed to read message body: {0}")]
    BodyRead(String),

    /// The handler returned an error.
    #[error("{0}")]
    Handler(#[from] HandlerError),

    /// The handler panicked on its worker thread.
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BodyRead(_) => 400,
            ServiceError::Handler(_) => 500,
            ServiceError::HandlerPanicked(_) => 500,
        }
    }

    /// Text returned to the caller as the response body.
    ///
    /// Handler failures are reported verbatim. A failure with no text is
    /// replaced by [`GENERIC_FAILURE`].
    pub fn body_text(&self) -> String {
        let text = self.to_string();
        if text.is_empty() {
            GENERIC_FAILURE.to_owned()
        } else {
            text
        }
    }
}
