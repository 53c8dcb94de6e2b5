use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::ServerEvent;
use super::participant::{now_millis, ConnectionId, Participant};

pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Outbound half of a connection; the websocket writer task drains the other end.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: ConnectionId,
    pub user_name: String,
    pub message: String,
    pub timestamp: u64,
}

/// Public metadata served by the room lookup endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub user_count: usize,
    pub language: String,
    pub created_at: u64,
}

struct Member {
    participant: Participant,
    outbox: EventSender,
}

/// One collaborative session. All access goes through the owning
/// coordinator's per-room mutex.
pub struct Room {
    id: String,
    document: String,
    language: String,
    chat_log: Vec<ChatMessage>,
    members: HashMap<ConnectionId, Member>,
    created_at: u64,
    closed: bool,
}

impl Room {
    pub fn new(id: String, host: Participant, outbox: EventSender) -> Self {
        let mut room = Self {
            id,
            document: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            chat_log: Vec::new(),
            members: HashMap::new(),
            created_at: now_millis(),
            closed: false,
        };
        room.add_member(host, outbox);
        room
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn chat_log(&self) -> &[ChatMessage] {
        &self.chat_log
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A closed room has been emptied and is on its way out of the registry.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn add_member(&mut self, participant: Participant, outbox: EventSender) {
        self.members.insert(participant.id, Member { participant, outbox });
    }

    pub fn remove_member(&mut self, id: &ConnectionId) -> Option<Participant> {
        self.members.remove(id).map(|member| member.participant)
    }

    pub fn participant(&self, id: &ConnectionId) -> Option<&Participant> {
        self.members.get(id).map(|member| &member.participant)
    }

    pub fn participant_mut(&mut self, id: &ConnectionId) -> Option<&mut Participant> {
        self.members.get_mut(id).map(|member| &mut member.participant)
    }

    /// Roster ordered by join time so every client renders the same list
    pub fn participants(&self) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .members
            .values()
            .map(|member| member.participant.clone())
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        participants
    }

    pub fn set_document(&mut self, text: String) {
        self.document = text;
    }

    pub fn set_language(&mut self, language: String) {
        self.language = language;
    }

    /// Appends a message stamped with a fresh id. Timestamps never go
    /// backwards within one room even if the wall clock does.
    pub fn append_chat(&mut self, author: &Participant, text: String) -> ChatMessage {
        let last = self.chat_log.last().map(|m| m.timestamp).unwrap_or(0);
        let message = ChatMessage {
            id: Uuid::new_v4(),
            user_id: author.id,
            user_name: author.name.clone(),
            message: text,
            timestamp: now_millis().max(last),
        };
        self.chat_log.push(message.clone());
        message
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            user_count: self.members.len(),
            language: self.language.clone(),
            created_at: self.created_at,
        }
    }

    pub fn send_to(&self, id: &ConnectionId, event: ServerEvent) -> bool {
        match self.members.get(id) {
            Some(member) => deliver(&member.outbox, id, event),
            None => false,
        }
    }

    pub fn broadcast(&self, event: &ServerEvent) {
        for (id, member) in &self.members {
            deliver(&member.outbox, id, event.clone());
        }
    }

    pub fn broadcast_except(&self, excluded: &ConnectionId, event: &ServerEvent) {
        for (id, member) in &self.members {
            if id != excluded {
                deliver(&member.outbox, id, event.clone());
            }
        }
    }
}

/// A closed receiver means the connection is already tearing down.
pub(crate) fn deliver(outbox: &EventSender, id: &ConnectionId, event: ServerEvent) -> bool {
    match outbox.send(event) {
        Ok(()) => true,
        Err(_) => {
            tracing::debug!(connection_id = %id, "Dropping event for closed connection");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::participant::Role;

    fn member(name: &str, role: Role) -> (Participant, EventSender, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Participant::new(Uuid::new_v4(), name.to_string(), role), tx, rx)
    }

    #[test]
    fn test_new_room_defaults() {
        let (host, tx, _rx) = member("Hana", Role::Host);
        let room = Room::new("ABCD".to_string(), host.clone(), tx);

        assert_eq!(room.id(), "ABCD");
        assert_eq!(room.document(), "");
        assert_eq!(room.language(), DEFAULT_LANGUAGE);
        assert_eq!(room.len(), 1);
        assert_eq!(room.participant(&host.id), Some(&host));
        assert!(!room.is_closed());
    }

    #[test]
    fn test_chat_log_is_ordered() {
        let (host, tx, _rx) = member("Hana", Role::Host);
        let mut room = Room::new("ABCD".to_string(), host.clone(), tx);

        let first = room.append_chat(&host, "hello".to_string());
        let second = room.append_chat(&host, "world".to_string());

        assert_ne!(first.id, second.id);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(room.chat_log(), &[first, second]);
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let (host, host_tx, mut host_rx) = member("Hana", Role::Host);
        let (guest, guest_tx, mut guest_rx) = member("Gil", Role::Guest);
        let mut room = Room::new("ABCD".to_string(), host.clone(), host_tx);
        room.add_member(guest, guest_tx);

        room.broadcast_except(&host.id, &ServerEvent::DocumentChanged { text: "x".to_string() });

        assert!(host_rx.try_recv().is_err());
        assert!(matches!(guest_rx.try_recv(), Ok(ServerEvent::DocumentChanged { .. })));
    }

    #[test]
    fn test_remove_last_member_empties_room() {
        let (host, tx, _rx) = member("Hana", Role::Host);
        let mut room = Room::new("ABCD".to_string(), host.clone(), tx);

        assert_eq!(room.remove_member(&host.id).map(|p| p.name), Some("Hana".to_string()));
        assert!(room.is_empty());
        assert!(room.remove_member(&host.id).is_none());
    }

    #[test]
    fn test_send_to_dropped_receiver() {
        let (host, tx, rx) = member("Hana", Role::Host);
        let room = Room::new("ABCD".to_string(), host.clone(), tx);
        drop(rx);

        assert!(!room.send_to(&host.id, ServerEvent::LanguageChanged { language: "rust".to_string() }));
        assert!(!room.send_to(&Uuid::new_v4(), ServerEvent::LanguageChanged { language: "rust".to_string() }));
    }
}
