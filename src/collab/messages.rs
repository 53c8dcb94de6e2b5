use serde::{Deserialize, Serialize};

use super::participant::{ConnectionId, Participant, Permission, Role};
use super::room::ChatMessage;
use super::schedule::ScheduledSession;
use crate::judge::ExecutionResult;

/// Everything a client may send over its connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    Join {
        room_id: String,
        display_name: String,
        role: Role,
    },

    EditDocument {
        room_id: String,
        text: String,
    },

    ChangeLanguage {
        room_id: String,
        language: String,
    },

    PostChat {
        room_id: String,
        text: String,
    },

    SetPermission {
        room_id: String,
        target_user_id: ConnectionId,
        permission: Permission,
    },

    Execute {
        room_id: String,
        text: String,
        language: String,
    },

    ScheduleSession {
        room_id: String,
        title: String,
        #[serde(default)]
        description: String,
        time: String,
    },

    ListScheduledSessions {
        room_id: String,
    },

    StartCall {
        room_id: String,
    },

    EndCall {
        room_id: String,
    },

    Offer {
        target: ConnectionId,
        payload: serde_json::Value,
    },

    Answer {
        target: ConnectionId,
        payload: serde_json::Value,
    },

    IceCandidate {
        target: ConnectionId,
        payload: serde_json::Value,
    },

    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RosterChange {
    Joined {
        participant_id: ConnectionId,
        display_name: String,
    },
    Left {
        participant_id: ConnectionId,
        display_name: String,
    },
}

/// Everything the coordinator may push to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
    },

    RoomSnapshot {
        room_id: String,
        participant: Participant,
        document: String,
        language: String,
    },

    RosterChanged {
        change: RosterChange,
        participants: Vec<Participant>,
    },

    DocumentChanged {
        text: String,
    },

    LanguageChanged {
        language: String,
    },

    ChatMessage(ChatMessage),

    PermissionChanged {
        target_user_id: ConnectionId,
        permission: Permission,
    },

    ExecutionResult(ExecutionResult),

    SessionScheduled(ScheduledSession),

    ScheduledSessions {
        sessions: Vec<ScheduledSession>,
    },

    CallStarted {
        initiator: String,
        participant_id: ConnectionId,
    },

    CallEnded {
        participant_id: ConnectionId,
    },

    Offer {
        from: ConnectionId,
        payload: serde_json::Value,
    },

    Answer {
        from: ConnectionId,
        payload: serde_json::Value,
    },

    IceCandidate {
        from: ConnectionId,
        payload: serde_json::Value,
    },

    RoomNotFound {
        room_id: String,
    },

    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    pub fn signal(kind: SignalKind, from: ConnectionId, payload: serde_json::Value) -> Self {
        match kind {
            SignalKind::Offer => ServerEvent::Offer { from, payload },
            SignalKind::Answer => ServerEvent::Answer { from, payload },
            SignalKind::IceCandidate => ServerEvent::IceCandidate { from, payload },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_command() {
        let raw = json!({
            "type": "Join",
            "room_id": "ABCD",
            "display_name": "Hana",
            "role": "host"
        });

        let command: ClientCommand = serde_json::from_value(raw).unwrap();
        match command {
            ClientCommand::Join { room_id, display_name, role } => {
                assert_eq!(room_id, "ABCD");
                assert_eq!(display_name, "Hana");
                assert_eq!(role, Role::Host);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = json!({ "type": "EditDocument", "room_id": "ABCD" });
        assert!(serde_json::from_value::<ClientCommand>(raw).is_err());
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let raw = json!({ "type": "KickEveryone", "room_id": "ABCD" });
        assert!(serde_json::from_value::<ClientCommand>(raw).is_err());
    }

    #[test]
    fn test_signal_payload_is_opaque() {
        let raw = json!({
            "type": "IceCandidate",
            "target": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "payload": { "candidate": "candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host", "sdpMLineIndex": 0 }
        });

        let command: ClientCommand = serde_json::from_value(raw).unwrap();
        assert!(matches!(command, ClientCommand::IceCandidate { .. }));
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = ServerEvent::PermissionChanged {
            target_user_id: uuid::Uuid::nil(),
            permission: Permission::Editor,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "PermissionChanged");
        assert_eq!(value["permission"], "editor");

        let roster = ServerEvent::RosterChanged {
            change: RosterChange::Left {
                participant_id: uuid::Uuid::nil(),
                display_name: "Gil".to_string(),
            },
            participants: Vec::new(),
        };
        let value = serde_json::to_value(&roster).unwrap();
        assert_eq!(value["change"]["kind"], "Left");
        assert_eq!(value["change"]["display_name"], "Gil");
    }
}
