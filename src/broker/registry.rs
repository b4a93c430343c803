//! Client registry
//!
//! The registry owns three mappings that are kept consistent after every
//! completed mutation:
//! - topic -> ordered set of publisher connection ids
//! - topic -> ordered set of subscriber connection ids
//! - connection id -> member metadata (role, topic, transport handle)
//!
//! A connection id is present in the metadata map if and only if it is in
//! exactly one topic set, and a topic key only exists while its set is
//! non-empty.
//!
//! Concurrency: all state sits behind a single async mutex. Registry
//! operations and the broadcaster's delivery pass (see `broadcast`) run under
//! that one lock, so a publish never observes a half-applied membership
//! change. Lock order is always registry first, then a client's writer.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::broker::topic::{ConnectionId, Role};
use crate::client::ClientHandle;
use crate::utils::error::BrokerError;

/// Metadata kept for every registered connection.
#[derive(Debug, Clone)]
pub struct Member {
    pub role: Role,
    pub topic: String,
    pub handle: Arc<ClientHandle>,
}

/// Point-in-time publisher/subscriber counts per topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    pub publishers: BTreeMap<String, usize>,
    pub subscribers: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    publishers: HashMap<String, BTreeSet<ConnectionId>>,
    subscribers: HashMap<String, BTreeSet<ConnectionId>>,
    members: HashMap<ConnectionId, Member>,
    closed: bool,
}

impl RegistryState {
    fn topics_mut(&mut self, role: Role) -> &mut HashMap<String, BTreeSet<ConnectionId>> {
        match role {
            Role::Publisher => &mut self.publishers,
            Role::Subscriber => &mut self.subscribers,
        }
    }

    fn insert(
        &mut self,
        handle: Arc<ClientHandle>,
        role: Role,
        topic: &str,
    ) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::ShuttingDown);
        }
        let id = handle.id();
        if self.members.contains_key(&id) {
            return Err(BrokerError::AlreadyRegistered(id));
        }

        self.topics_mut(role)
            .entry(topic.to_string())
            .or_default()
            .insert(id);
        self.members.insert(
            id,
            Member {
                role,
                topic: topic.to_string(),
                handle,
            },
        );
        Ok(())
    }

    /// Removes `id` from its topic set and the metadata map. Drops the topic
    /// key when its set becomes empty. Returns `None` if `id` is unknown.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Member> {
        let member = self.members.remove(&id)?;
        let topics = self.topics_mut(member.role);
        if let Some(set) = topics.get_mut(&member.topic) {
            set.remove(&id);
            if set.is_empty() {
                topics.remove(&member.topic);
            }
        }
        Some(member)
    }

    /// Subscribers of `topic` in registration order.
    pub(crate) fn subscribers_of(&self, topic: &str) -> Vec<Arc<ClientHandle>> {
        self.subscribers
            .get(topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.members.get(id))
                    .map(|m| Arc::clone(&m.handle))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn status(&self) -> RegistryStatus {
        let count = |map: &HashMap<String, BTreeSet<ConnectionId>>| -> BTreeMap<String, usize> {
            map.iter()
                .map(|(topic, ids)| (topic.clone(), ids.len()))
                .collect()
        };
        RegistryStatus {
            publishers: count(&self.publishers),
            subscribers: count(&self.subscribers),
        }
    }
}

/// Shared, cloneable handle to one broker's membership table.
///
/// Each broker instance builds its own registry; nothing here is global.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Registers a connection that completed its handshake.
    ///
    /// Fails if the connection is already registered or the registry has been
    /// drained by shutdown.
    pub async fn register(
        &self,
        handle: Arc<ClientHandle>,
        role: Role,
        topic: &str,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock().await;
        let (id, peer) = (handle.id(), handle.addr().to_string());
        state.insert(handle, role, topic)?;

        info!(id, %peer, %role, topic, "client registered");
        log_status(&state.status());
        Ok(())
    }

    /// Removes a connection and closes its transport.
    ///
    /// Idempotent: returns `false` and does nothing if `id` is not registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut state = self.lock().await;
        let Some(member) = state.remove(id) else {
            return false;
        };
        member.handle.close().await;

        info!(
            id,
            peer = %member.handle.addr(),
            role = %member.role,
            topic = %member.topic,
            "client unregistered"
        );
        log_status(&state.status());
        true
    }

    /// Copy of the current subscriber set for `topic`, in registration order.
    pub async fn snapshot_subscribers(&self, topic: &str) -> Vec<Arc<ClientHandle>> {
        self.lock().await.subscribers_of(topic)
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().await.subscribers.get(topic).map_or(0, BTreeSet::len)
    }

    pub async fn publisher_count(&self, topic: &str) -> usize {
        self.lock().await.publishers.get(topic).map_or(0, BTreeSet::len)
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.lock().await.members.contains_key(&id)
    }

    pub async fn member(&self, id: ConnectionId) -> Option<Member> {
        self.lock().await.members.get(&id).cloned()
    }

    /// Number of registered connections across all topics and roles.
    pub async fn len(&self) -> usize {
        self.lock().await.members.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn status(&self) -> RegistryStatus {
        self.lock().await.status()
    }

    /// Clears every mapping and returns the handles that were registered.
    ///
    /// After a drain the registry refuses new registrations. The caller is
    /// responsible for closing the returned handles.
    pub async fn drain(&self) -> Vec<Arc<ClientHandle>> {
        let mut state = self.lock().await;
        state.closed = true;
        state.publishers.clear();
        state.subscribers.clear();
        let handles: Vec<_> = state.members.drain().map(|(_, m)| m.handle).collect();
        debug!(count = handles.len(), "registry drained");
        handles
    }
}

fn log_status(status: &RegistryStatus) {
    info!(
        publishers = ?status.publishers,
        subscribers = ?status.subscribers,
        "topic status"
    );
}
