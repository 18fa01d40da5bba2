//! The message handler contract.
//!
//! A [`Handler`] turns one inbound message into zero or one outbound messages.
//! The runtime invokes it synchronously, once per `POST /messages` request, on
//! a blocking worker thread. Implementations must therefore be safe to call
//! concurrently from many threads.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use thiserror::Error;

/// Outcome of a single handler invocation.
///
/// - `Ok(Some(bytes))` — respond with content (an empty payload is still content).
/// - `Ok(None)` — nothing to send back.
/// - `Err(e)` — the invocation failed; `e`'s message is returned to the caller.
pub type HandlerResult = Result<Option<Bytes>, HandlerError>;

/// Application-specific transformation of one message.
pub trait Handler: Send + Sync + 'static {
    /// Handle `message`, returning an optional reply.
    fn handle(&self, message: &[u8], context: &Context) -> HandlerResult;
}

/// Failure raised by a [`Handler`].
///
/// `Display` renders the message text only, so it can be used verbatim as a
/// response body.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A plain human-readable failure message.
    #[error("{0}")]
    Message(String),

    /// Any other error raised inside the handler.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Construct a [`HandlerError`] from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Auxiliary key-value metadata that accompanies a message.
///
/// Always empty today; kept in the contract so metadata can be added without
/// changing the handler signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context(BTreeMap<String, String>);

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when no metadata accompanies the message, which is always the
    /// case for messages delivered over `/messages`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A [`Handler`] backed by a closure. Created with [`from_fn`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Adapt a closure into a [`Handler`].
///
/// ```
/// use bytes::Bytes;
/// use common::handler::{from_fn, Context, Handler};
///
/// let upper = from_fn(|msg: &[u8], _ctx: &Context| {
///     Ok(Some(Bytes::from(msg.to_ascii_uppercase())))
/// });
/// let out = upper.handle(b"abc", &Context::new()).unwrap();
/// assert_eq!(out.as_deref(), Some(&b"ABC"[..]));
/// ```
pub fn from_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&[u8], &Context) -> HandlerResult + Send + Sync + 'static,
{
    FnHandler { f }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&[u8], &Context) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, message: &[u8], context: &Context) -> HandlerResult {
        (self.f)(message, context)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}
