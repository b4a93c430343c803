//! Server-side handle of one accepted connection.
//!
//! The handle owns the write half of the transport. Reads stay with the
//! connection worker; writes come only from the broadcaster. Closing the
//! handle shuts the write half down and flips a watch flag the worker selects
//! on, so a worker blocked in a read unwinds through its normal cleanup.

use std::fmt;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::broker::topic::ConnectionId;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct ClientHandle {
    id: ConnectionId,
    addr: String,
    writer: Mutex<BoxedWriter>,
    closed: watch::Sender<bool>,
}

impl ClientHandle {
    pub fn new<W>(id: ConnectionId, addr: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            addr: addr.into(),
            writer: Mutex::new(Box::new(writer)),
            closed,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, used in logs and in the delivery envelope.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Writes one already-terminated line and flushes it.
    pub async fn send_line(&self, line: &str) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection closed",
            ));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }

    /// Closes the transport. Only the first call has an effect; returns
    /// whether this call did the closing.
    pub async fn close(&self) -> bool {
        if self.closed.send_replace(true) {
            return false;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(id = self.id, peer = %self.addr, error = %e, "shutdown of write half failed");
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Receiver that observes `true` once the handle is closed.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}
