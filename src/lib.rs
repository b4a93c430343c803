//! # tcpsub
//!
//! `tcpsub` is a topic-based publish/subscribe broker over plain TCP. Clients
//! send a single `ROLE:TOPIC` handshake line, after which every line a
//! publisher sends is delivered to all subscribers currently registered on the
//! same topic as `[<topic>] Publisher <address>: <message>`.
//!
//! ## Core Modules
//!
//! - `broker`: the topic-indexed client registry and the broadcaster.
//! - `client`: the broker's per-connection handle and a line-protocol client.
//! - `config`: layered settings loading.
//! - `transport`: handshake parsing, the connection worker, the listener and shutdown.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
