//! The `broker` module holds the shared routing state and the fan-out path:
//!
//! - `topic`: roles and connection ids.
//! - `registry`: the topic-indexed membership table, the only mutable shared
//!   state in the broker.
//! - `broadcast`: delivers one publisher line to a topic's subscribers.
//! - `message`: the envelope format subscribers receive.

pub mod broadcast;
pub mod message;
pub mod registry;
pub mod topic;

pub use broadcast::Broadcaster;
pub use registry::{Registry, RegistryStatus};
pub use topic::{ConnectionId, Role};
