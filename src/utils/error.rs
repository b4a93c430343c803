//! Error types for the broker.
//!
//! Per-connection failures are absorbed by the connection worker; only startup
//! failures (bind, configuration) are meant to reach `main`.

use std::io;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::broker::topic::ConnectionId;

/// Reasons a handshake line is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("missing ':' separator in '{0}'")]
    MissingSeparator(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("topic is empty")]
    EmptyTopic,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Lines(#[from] LinesCodecError),

    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),

    #[error("broker is shutting down")]
    ShuttingDown,

    #[error("listener already taken by a running accept loop")]
    ListenerTaken,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("malformed handshake: {0}")]
    Handshake(#[from] HandshakeError),
}
