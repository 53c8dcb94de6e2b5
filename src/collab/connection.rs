use std::collections::HashMap;

use tokio::sync::RwLock;

use super::messages::ServerEvent;
use super::participant::{ConnectionId, Role};
use super::room::{deliver, EventSender};

/// Where a connection currently sits. The authoritative participant state
/// lives in the room; this is only the index used to find it.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub room_id: String,
    pub display_name: String,
    pub role: Role,
}

struct ConnectionEntry {
    outbox: EventSender,
    membership: Option<Membership>,
}

/// Maps live connection ids to their outbox and current membership.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, id: ConnectionId, outbox: EventSender) {
        let mut connections = self.connections.write().await;
        connections.insert(id, ConnectionEntry { outbox, membership: None });
    }

    /// Returns false if the connection has already gone away.
    pub async fn attach(&self, id: &ConnectionId, membership: Membership) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(id) {
            Some(entry) => {
                entry.membership = Some(membership);
                true
            }
            None => false,
        }
    }

    /// Clears the membership, returning what it was.
    pub async fn detach(&self, id: &ConnectionId) -> Option<Membership> {
        let mut connections = self.connections.write().await;
        connections.get_mut(id).and_then(|entry| entry.membership.take())
    }

    pub async fn lookup(&self, id: &ConnectionId) -> Option<Membership> {
        let connections = self.connections.read().await;
        connections.get(id).and_then(|entry| entry.membership.clone())
    }

    pub async fn outbox(&self, id: &ConnectionId) -> Option<EventSender> {
        let connections = self.connections.read().await;
        connections.get(id).map(|entry| entry.outbox.clone())
    }

    /// Removes the entry entirely, returning the membership it held.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Membership> {
        let mut connections = self.connections.write().await;
        connections.remove(id).and_then(|entry| entry.membership)
    }

    pub async fn send_to(&self, id: &ConnectionId, event: ServerEvent) -> bool {
        match self.outbox(id).await {
            Some(outbox) => deliver(&outbox, id, event),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn participant_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.values().filter(|entry| entry.membership.is_some()).count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
