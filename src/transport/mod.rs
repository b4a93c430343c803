//! The `transport` module is responsible for the TCP side of the broker.
//!
//! - `message`: handshake parsing and the `terminate` control line.
//! - `worker`: the per-connection state machine.
//! - `tcp`: the listener, the bounded worker pool and coordinated shutdown.

pub mod message;
pub mod tcp;
pub mod worker;

pub use tcp::Server;
