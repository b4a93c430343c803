//! TCP listener and shutdown coordination
//!
//! `Server::bind` acquires the listening socket (the only startup failure),
//! `run` accepts connections and hands each one to a `ConnectionWorker` task,
//! and `shutdown` tears everything down: it stops the accept loop, closes every
//! registered connection, clears the registry and drains the worker pool with
//! a bounded grace period before aborting stragglers. If a publish is stuck
//! writing to a subscriber, the registry stays locked; once the grace period
//! runs out the workers are aborted first so the registry can be cleared.
//!
//! The pool is bounded by a semaphore; a connection that arrives when all
//! permits are taken is closed straight away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::{Broadcaster, ConnectionId, Registry};
use crate::client::ClientHandle;
use crate::config::{BrokerSettings, Settings};
use crate::transport::worker::ConnectionWorker;
use crate::utils::error::BrokerError;

struct Shared {
    local_addr: SocketAddr,
    settings: BrokerSettings,
    registry: Registry,
    broadcaster: Broadcaster,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    listener: Mutex<Option<TcpListener>>,
    workers: Mutex<JoinSet<()>>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
}

/// A broker instance. Cheap to clone; clones share the same state so one task
/// can run the accept loop while another triggers shutdown.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    /// Binds `settings.server.host:settings.server.port`.
    pub async fn bind(settings: &Settings) -> Result<Self, BrokerError> {
        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BrokerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let registry = Registry::new();
        let broadcaster = Broadcaster::from_settings(registry.clone(), &settings.broker);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            shared: Arc::new(Shared {
                local_addr,
                settings: settings.broker.clone(),
                registry,
                broadcaster,
                running: AtomicBool::new(true),
                shutdown,
                listener: Mutex::new(Some(listener)),
                workers: Mutex::new(JoinSet::new()),
                permits: Arc::new(Semaphore::new(settings.broker.max_connections)),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.shared.broadcaster
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Accepts connections until shutdown is requested.
    ///
    /// Returns an error if an accept failure (while still running) ended the
    /// loop, or if another `run` already owns the listener.
    pub async fn run(&self) -> Result<(), BrokerError> {
        let listener = self
            .shared
            .listener
            .lock()
            .await
            .take()
            .ok_or(BrokerError::ListenerTaken)?;
        let mut shutdown = self.shared.shutdown.subscribe();

        info!(addr = %self.shared.local_addr, "server listening");

        let result = loop {
            if !self.is_running() {
                break Ok(());
            }
            let accepted = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break Ok(()),
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => self.dispatch(stream, peer).await,
                Err(e) if !self.is_running() => {
                    debug!(error = %e, "accept interrupted by shutdown");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break Err(BrokerError::Accept(e));
                }
            }
        };

        drop(listener);
        info!(addr = %self.shared.local_addr, "listener closed");
        result
    }

    async fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let Ok(permit) = Arc::clone(&self.shared.permits).try_acquire_owned() else {
            warn!(%peer, "connection rejected: limit reached");
            return;
        };

        let id: ConnectionId = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let handle = Arc::new(ClientHandle::new(id, peer.to_string(), writer));
        let worker = ConnectionWorker::new(
            handle,
            reader,
            self.shared.broadcaster.clone(),
            self.shared.shutdown.subscribe(),
            self.shared.settings.max_line_bytes,
        );

        let mut workers = self.shared.workers.lock().await;
        // checked under the pool lock so shutdown cannot miss this worker
        if !self.is_running() {
            debug!(%peer, "dropping connection accepted during shutdown");
            return;
        }
        while workers.try_join_next().is_some() {}
        workers.spawn(async move {
            let _permit = permit;
            worker.run().await;
        });
    }

    /// Stops the broker. Safe to call more than once and from any task; only
    /// the first call does the work.
    pub async fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("initiating server shutdown");

        self.shared.shutdown.send_replace(true);
        // close the listener here if no accept loop ever took it
        self.shared.listener.lock().await.take();

        let grace = Duration::from_secs(self.shared.settings.shutdown_grace_secs);
        let handles = match timeout(grace, self.shared.registry.drain()).await {
            Ok(handles) => handles,
            Err(_) => {
                // a publish stuck on a subscriber write holds the registry lock
                warn!("registry still busy after grace period, aborting workers");
                self.shared.workers.lock().await.abort_all();
                self.shared.registry.drain().await
            }
        };
        for handle in &handles {
            handle.close().await;
        }
        info!(closed = handles.len(), "closed client connections");

        let mut workers = std::mem::take(&mut *self.shared.workers.lock().await);
        if timeout(grace, join_all(&mut workers)).await.is_err() {
            warn!(remaining = workers.len(), "grace period expired, aborting workers");
            workers.abort_all();
            join_all(&mut workers).await;
        }

        info!("server shutdown complete");
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                error!(error = %e, "connection worker panicked");
            }
        }
    }
}
