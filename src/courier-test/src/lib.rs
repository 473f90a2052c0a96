//! Test support for the Courier client.
//!
//! - [`LoopbackServer`] + [`LoopbackConnector`]: an in-process transport that
//!   runs bound methods, enforces deadlines and `wait_for_ready`, and calls
//!   back on its own runtime threads.
//! - [`ScriptedTransport`] + [`ScriptedConnector`]: records every call and
//!   lets the test decide when, and whether, callbacks fire.

mod loopback;
mod methods;
mod scripted;

pub use loopback::{LoopbackConnector, LoopbackServer, LoopbackTransport};
pub use methods::{MethodFn, MethodTable, arithmetic};
pub use scripted::{ScriptedConnector, ScriptedTransport};

/// Install a stderr `tracing` subscriber honoring `RUST_LOG`, once.
///
/// Useful at the top of a test that needs to see the client's logs.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courier=debug")),
        )
        .with_test_writer()
        .try_init();
}
