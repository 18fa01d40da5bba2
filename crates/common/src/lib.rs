//! Handler contract, protocol definitions, and errors shared across `dataflow-runtime` crates.

pub mod echo;
pub mod error;
pub mod handler;
pub mod protocol;

pub use echo::EchoHandler;
pub use error::ServiceError;
pub use handler::{from_fn, Context, FnHandler, Handler, HandlerError, HandlerResult};
