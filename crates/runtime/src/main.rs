//! `dataflow-runtime` binary entry point.
//!
//! Serves the reference [`EchoHandler`]. Applications that need their own
//! logic depend on the library and call [`dataflow_runtime::start`] with their
//! handler instead.

use anyhow::Result;
use dataflow_runtime::EchoHandler;

fn main() -> Result<()> {
    dataflow_runtime::start(EchoHandler)
}
