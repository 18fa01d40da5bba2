//! Reference handler used by the `dataflow-runtime` binary.

use bytes::Bytes;

use crate::handler::{Context, Handler, HandlerResult};

/// Prefix prepended to every echoed message.
pub const GREETING: &str = "hi! ";

/// Replies with [`GREETING`] followed by the message decoded as UTF-8.
///
/// Invalid UTF-8 sequences are replaced with U+FFFD. Never fails and never
/// returns an empty reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn handle(&self, message: &[u8], _context: &Context) -> HandlerResult {
        let text = String::from_utf8_lossy(message);
        let mut out = String::with_capacity(GREETING.len() + text.len());
        out.push_str(GREETING);
        out.push_str(&text);
        Ok(Some(Bytes::from(out)))
    }
}
