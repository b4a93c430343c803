//! Connection worker
//!
//! One worker runs per accepted connection and walks
//! `Connected -> AwaitingHandshake -> Registered -> Closing -> Closed`.
//! A failed handshake goes straight to `Closing` without touching the
//! registry. Publishers forward every non-`terminate` line to the
//! broadcaster; subscribers only read to notice `terminate` or end of
//! stream, since their deliveries are written by the broadcaster.
//!
//! Lines are framed on `\n` as raw bytes and decoded lossily, so a stray
//! non-UTF-8 byte is replaced with U+FFFD instead of ending the session.
//!
//! Every read also watches the handle's close flag and the server's shutdown
//! flag, so closing the transport from outside unblocks the worker and it
//! cleans up through `Closing` like any other disconnect.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, info, warn};

use crate::broker::topic::Role;
use crate::broker::{Broadcaster, Registry};
use crate::client::ClientHandle;
use crate::transport::message::{Handshake, decode_line, is_terminate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Connected,
    AwaitingHandshake,
    Registered { role: Role, topic: String },
    Closing,
    Closed,
}

pub struct ConnectionWorker<R> {
    handle: Arc<ClientHandle>,
    lines: FramedRead<R, AnyDelimiterCodec>,
    registry: Registry,
    broadcaster: Broadcaster,
    closed: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
}

impl<R> ConnectionWorker<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        handle: Arc<ClientHandle>,
        reader: R,
        broadcaster: Broadcaster,
        shutdown: watch::Receiver<bool>,
        max_line_bytes: usize,
    ) -> Self {
        let closed = handle.closed();
        Self {
            handle,
            lines: FramedRead::new(
                reader,
                AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_bytes),
            ),
            registry: broadcaster.registry().clone(),
            broadcaster,
            closed,
            shutdown,
        }
    }

    /// Drives the connection to `Closed`. Never fails: every error ends in cleanup.
    pub async fn run(mut self) {
        let mut state = WorkerState::Connected;
        loop {
            state = match state {
                WorkerState::Connected => {
                    info!(peer = %self.handle.addr(), "connected");
                    WorkerState::AwaitingHandshake
                }
                WorkerState::AwaitingHandshake => self.await_handshake().await,
                WorkerState::Registered { role, topic } => self.serve(role, &topic).await,
                WorkerState::Closing => {
                    self.close().await;
                    WorkerState::Closed
                }
                WorkerState::Closed => break,
            };
        }
    }

    async fn await_handshake(&mut self) -> WorkerState {
        let peer = self.handle.addr().to_string();
        let Some(line) = self.next_line().await else {
            debug!(%peer, "closed before handshake");
            return WorkerState::Closing;
        };

        let handshake = match Handshake::parse(&line) {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(%peer, error = %e, "rejected handshake");
                return WorkerState::Closing;
            }
        };

        match self
            .registry
            .register(Arc::clone(&self.handle), handshake.role, &handshake.topic)
            .await
        {
            Ok(()) => WorkerState::Registered {
                role: handshake.role,
                topic: handshake.topic,
            },
            Err(e) => {
                warn!(%peer, error = %e, "registration refused");
                WorkerState::Closing
            }
        }
    }

    async fn serve(&mut self, role: Role, topic: &str) -> WorkerState {
        while let Some(line) = self.next_line().await {
            if is_terminate(&line) {
                info!(peer = %self.handle.addr(), %role, topic, "client sent terminate");
                break;
            }
            debug!(peer = %self.handle.addr(), %role, topic, message = %line, "received");
            if role == Role::Publisher {
                self.broadcaster
                    .publish(topic, &line, self.handle.addr())
                    .await;
            }
        }
        WorkerState::Closing
    }

    async fn close(&mut self) {
        self.registry.unregister(self.handle.id()).await;
        self.handle.close().await;
        info!(peer = %self.handle.addr(), "disconnected");
    }

    /// Next line from the peer, or `None` on end of stream, read error, an
    /// over-long line, or when the connection is being closed from outside.
    async fn next_line(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = self.closed.wait_for(|closed| *closed) => None,
            _ = self.shutdown.wait_for(|stop| *stop) => None,
            line = self.lines.next() => match line {
                Some(Ok(frame)) => Some(decode_line(&frame)),
                Some(Err(e)) => {
                    debug!(peer = %self.handle.addr(), error = %e, "read failed");
                    None
                }
                None => None,
            },
        }
    }
}
