use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::connection::{ConnectionRegistry, Membership};
use super::messages::{ClientCommand, RosterChange, ServerEvent, SignalKind};
use super::participant::{ConnectionId, Participant, Permission, Role};
use super::room::{ChatMessage, EventSender, Room, RoomSummary};
use super::schedule::{ScheduledSession, SessionSchedule};
use crate::error::{CoordinatorError, Result};
use crate::judge::{ExecutionRequest, ExecutionResult, Judge};

const SESSION_CODE_LEN: usize = 8;

type SharedRoom = Arc<Mutex<Room>>;

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub participant: Participant,
    pub created: bool,
}

/// Owns every room and connection of the process.
///
/// The registry lock is only held to look up, insert or unlink a room; all
/// room state changes happen under that room's own mutex, so work in
/// different rooms never contends. Lock order is registry, then room, then
/// the connection index.
pub struct Coordinator {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    connections: ConnectionRegistry,
    schedule: SessionSchedule,
    judge: Arc<dyn Judge>,
    judge_timeout: Duration,
}

impl Coordinator {
    pub fn new(judge: Arc<dyn Judge>, judge_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            connections: ConnectionRegistry::new(),
            schedule: SessionSchedule::new(),
            judge,
            judge_timeout,
        })
    }

    /// Registers a fresh transport connection and tells it its id.
    pub async fn connect(&self, outbox: EventSender) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.register(id, outbox).await;
        self.connections
            .send_to(&id, ServerEvent::Connected { connection_id: id })
            .await;
        tracing::info!(connection_id = %id, "Connection registered");
        id
    }

    /// Safe to call any number of times for the same connection.
    pub async fn disconnect(&self, id: &ConnectionId) {
        if let Some(membership) = self.connections.remove(id).await {
            self.remove_from_room(&membership.room_id, id).await;
        }
        tracing::info!(connection_id = %id, "Connection closed");
    }

    /// Runs one inbound command. Failures are reported to the caller only.
    pub async fn dispatch(self: &Arc<Self>, id: ConnectionId, command: ClientCommand) {
        if let Err(e) = self.handle_command(id, command).await {
            self.notify_error(&id, &e).await;
        }
    }

    async fn handle_command(self: &Arc<Self>, id: ConnectionId, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::Join { room_id, display_name, role } => {
                match self.join_room(id, &room_id, &display_name, role).await {
                    Err(CoordinatorError::RoomNotFound(room_id)) => {
                        self.connections
                            .send_to(&id, ServerEvent::RoomNotFound { room_id })
                            .await;
                        Ok(())
                    }
                    other => other.map(|_| ()),
                }
            }
            ClientCommand::EditDocument { room_id, text } => self.apply_edit(&id, &room_id, text).await,
            ClientCommand::ChangeLanguage { room_id, language } => {
                self.apply_language_change(&id, &room_id, language).await
            }
            ClientCommand::PostChat { room_id, text } => {
                self.post_chat_message(&id, &room_id, text).await.map(|_| ())
            }
            ClientCommand::SetPermission { room_id, target_user_id, permission } => {
                self.set_permission(&id, &room_id, &target_user_id, permission).await
            }
            ClientCommand::Execute { room_id, text, language } => {
                // Judge latency must not stall this connection's next event.
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = coordinator.execute_code(&id, &room_id, text, language).await {
                        coordinator.notify_error(&id, &e).await;
                    }
                });
                Ok(())
            }
            ClientCommand::ScheduleSession { room_id, title, description, time } => self
                .schedule_session(&id, &room_id, title, description, time)
                .await
                .map(|_| ()),
            ClientCommand::ListScheduledSessions { room_id } => {
                self.list_scheduled_sessions(&id, &room_id).await;
                Ok(())
            }
            ClientCommand::StartCall { room_id } => self.start_call(&id, &room_id).await,
            ClientCommand::EndCall { room_id } => self.end_call(&id, &room_id).await,
            ClientCommand::Offer { target, payload } => {
                self.relay_signal(SignalKind::Offer, &id, &target, payload).await;
                Ok(())
            }
            ClientCommand::Answer { target, payload } => {
                self.relay_signal(SignalKind::Answer, &id, &target, payload).await;
                Ok(())
            }
            ClientCommand::IceCandidate { target, payload } => {
                self.relay_signal(SignalKind::IceCandidate, &id, &target, payload).await;
                Ok(())
            }
            ClientCommand::Leave => {
                self.leave(&id).await;
                Ok(())
            }
        }
    }

    pub async fn notify_error(&self, id: &ConnectionId, err: &CoordinatorError) {
        tracing::debug!(connection_id = %id, error = %err, "Rejected client request");
        self.connections
            .send_to(
                id,
                ServerEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                },
            )
            .await;
    }

    /// Attaches the connection to `room_id`, creating the room for a host.
    pub async fn join_room(
        &self,
        id: ConnectionId,
        room_id: &str,
        display_name: &str,
        role: Role,
    ) -> Result<JoinOutcome> {
        let display_name = display_name.trim();
        if room_id.trim().is_empty() {
            return Err(CoordinatorError::malformed("room_id must not be empty"));
        }
        // every later lookup uses the id verbatim
        if room_id.trim() != room_id {
            return Err(CoordinatorError::malformed("room_id must not have surrounding whitespace"));
        }
        if display_name.is_empty() {
            return Err(CoordinatorError::malformed("display_name must not be empty"));
        }

        let outbox = self
            .connections
            .outbox(&id)
            .await
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(id.to_string()))?;

        // Identity is per connection: moving to another room means leaving first.
        match self.connections.lookup(&id).await {
            Some(current) if current.room_id == room_id => {
                return self.rejoin_room(id, room_id, display_name, role).await;
            }
            Some(_) => {
                self.leave(&id).await;
            }
            None => {}
        }

        let participant = Participant::new(id, display_name.to_string(), role);

        loop {
            let existing = self.rooms.read().await.get(room_id).cloned();

            let (shared, mut room, created) = match existing {
                Some(shared) => {
                    let room = shared.clone().lock_owned().await;
                    if room.is_closed() {
                        drop(room);
                        if role == Role::Guest {
                            return Err(CoordinatorError::RoomNotFound(room_id.to_string()));
                        }
                        self.unlink_room(room_id, &shared).await;
                        continue;
                    }
                    (shared, room, false)
                }
                None => {
                    if role == Role::Guest {
                        tracing::info!(
                            room_id = %room_id,
                            display_name = %display_name,
                            "Guest tried to join non-existent room"
                        );
                        return Err(CoordinatorError::RoomNotFound(room_id.to_string()));
                    }

                    let mut rooms = self.rooms.write().await;
                    if rooms.contains_key(room_id) {
                        // another host got there first
                        continue;
                    }
                    let shared = Arc::new(Mutex::new(Room::new(
                        room_id.to_string(),
                        participant.clone(),
                        outbox.clone(),
                    )));
                    let room = shared.clone().lock_owned().await;
                    rooms.insert(room_id.to_string(), shared.clone());
                    tracing::info!(room_id = %room_id, host = %display_name, "Room created");
                    (shared, room, true)
                }
            };

            if !created {
                room.add_member(participant.clone(), outbox.clone());
            }

            let membership = Membership {
                room_id: room_id.to_string(),
                display_name: display_name.to_string(),
                role,
            };

            if !self.connections.attach(&id, membership).await {
                // The connection closed while we were joining; undo.
                room.remove_member(&id);
                if room.is_empty() {
                    room.close();
                    drop(room);
                    self.unlink_room(room_id, &shared).await;
                }
                return Err(CoordinatorError::ParticipantNotFound(id.to_string()));
            }

            Self::welcome(&room, &participant);
            room.broadcast(&ServerEvent::RosterChanged {
                change: RosterChange::Joined {
                    participant_id: id,
                    display_name: display_name.to_string(),
                },
                participants: room.participants(),
            });

            tracing::info!(
                room_id = %room_id,
                connection_id = %id,
                display_name = %display_name,
                role = ?role,
                total_users = room.len(),
                "Participant joined room"
            );

            return Ok(JoinOutcome { participant, created });
        }
    }

    /// A Join for the room the connection already sits in updates its entry
    /// without leaving, so the room and its state survive.
    async fn rejoin_room(
        &self,
        id: ConnectionId,
        room_id: &str,
        display_name: &str,
        role: Role,
    ) -> Result<JoinOutcome> {
        let mut room = self.lock_room(room_id).await?;
        let participant = {
            let current = room
                .participant_mut(&id)
                .ok_or_else(|| CoordinatorError::ParticipantNotFound(id.to_string()))?;
            if current.role != role {
                let joined_at = current.joined_at;
                *current = Participant::new(id, display_name.to_string(), role);
                current.joined_at = joined_at;
            }
            current.name = display_name.to_string();
            current.clone()
        };

        let membership = Membership {
            room_id: room_id.to_string(),
            display_name: display_name.to_string(),
            role,
        };
        if !self.connections.attach(&id, membership).await {
            return Err(CoordinatorError::ParticipantNotFound(id.to_string()));
        }

        Self::welcome(&room, &participant);
        room.broadcast(&ServerEvent::RosterChanged {
            change: RosterChange::Joined {
                participant_id: id,
                display_name: display_name.to_string(),
            },
            participants: room.participants(),
        });

        tracing::debug!(room_id = %room_id, connection_id = %id, "Participant rejoined room in place");
        Ok(JoinOutcome { participant, created: false })
    }

    /// Current state and chat history for a participant that just arrived.
    fn welcome(room: &Room, participant: &Participant) {
        room.send_to(
            &participant.id,
            ServerEvent::RoomSnapshot {
                room_id: room.id().to_string(),
                participant: participant.clone(),
                document: room.document().to_string(),
                language: room.language().to_string(),
            },
        );
        for message in room.chat_log() {
            room.send_to(&participant.id, ServerEvent::ChatMessage(message.clone()));
        }
    }

    /// Leaves the current room but keeps the connection registered.
    pub async fn leave(&self, id: &ConnectionId) -> Option<Participant> {
        let membership = self.connections.detach(id).await?;
        self.remove_from_room(&membership.room_id, id).await
    }

    async fn remove_from_room(&self, room_id: &str, id: &ConnectionId) -> Option<Participant> {
        let shared = self.rooms.read().await.get(room_id).cloned()?;
        let mut room = shared.clone().lock_owned().await;
        let departed = room.remove_member(id)?;

        if room.is_empty() {
            room.close();
            drop(room);
            self.unlink_room(room_id, &shared).await;
            tracing::info!(room_id = %room_id, "Room deleted (empty)");
        } else {
            room.broadcast(&ServerEvent::RosterChanged {
                change: RosterChange::Left {
                    participant_id: departed.id,
                    display_name: departed.name.clone(),
                },
                participants: room.participants(),
            });
            tracing::info!(
                room_id = %room_id,
                connection_id = %id,
                remaining = room.len(),
                "Participant left room"
            );
        }

        Some(departed)
    }

    /// Unlinks only if the registry still points at this exact room.
    async fn unlink_room(&self, room_id: &str, shared: &SharedRoom) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(room_id).is_some_and(|current| Arc::ptr_eq(current, shared)) {
            rooms.remove(room_id);
        }
    }

    async fn room_handle(&self, room_id: &str) -> Result<SharedRoom> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::RoomNotFound(room_id.to_string()))
    }

    async fn lock_room(&self, room_id: &str) -> Result<OwnedMutexGuard<Room>> {
        let room = self.room_handle(room_id).await?.lock_owned().await;
        if room.is_closed() {
            return Err(CoordinatorError::RoomNotFound(room_id.to_string()));
        }
        Ok(room)
    }

    fn member<'a>(room: &'a Room, id: &ConnectionId) -> Result<&'a Participant> {
        room.participant(id)
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(id.to_string()))
    }

    pub async fn apply_edit(&self, id: &ConnectionId, room_id: &str, text: String) -> Result<()> {
        let mut room = self.lock_room(room_id).await?;
        let participant = Self::member(&room, id)?;

        if !participant.can_edit() {
            tracing::warn!(room_id = %room_id, connection_id = %id, "Dropped edit from viewer");
            return Err(CoordinatorError::unauthorized("edit the document"));
        }

        room.set_document(text.clone());
        room.broadcast_except(id, &ServerEvent::DocumentChanged { text });
        tracing::debug!(room_id = %room_id, connection_id = %id, "Document updated");
        Ok(())
    }

    pub async fn apply_language_change(
        &self,
        id: &ConnectionId,
        room_id: &str,
        language: String,
    ) -> Result<()> {
        let language = language.trim().to_string();
        if language.is_empty() {
            return Err(CoordinatorError::malformed("language must not be empty"));
        }

        let mut room = self.lock_room(room_id).await?;
        if !Self::member(&room, id)?.is_host() {
            tracing::warn!(room_id = %room_id, connection_id = %id, "Dropped language change from non-host");
            return Err(CoordinatorError::unauthorized("change the language"));
        }

        room.set_language(language.clone());
        room.broadcast(&ServerEvent::LanguageChanged { language: language.clone() });
        tracing::info!(room_id = %room_id, language = %language, "Language changed");
        Ok(())
    }

    pub async fn set_permission(
        &self,
        id: &ConnectionId,
        room_id: &str,
        target: &ConnectionId,
        permission: Permission,
    ) -> Result<()> {
        let mut room = self.lock_room(room_id).await?;
        if !Self::member(&room, id)?.is_host() {
            tracing::warn!(room_id = %room_id, connection_id = %id, "Dropped permission change from non-host");
            return Err(CoordinatorError::unauthorized("change permissions"));
        }

        let target_participant = room
            .participant_mut(target)
            .ok_or_else(|| CoordinatorError::ParticipantNotFound(target.to_string()))?;
        if !target_participant.set_permission(permission) {
            return Err(CoordinatorError::unauthorized("change a host's permission"));
        }

        let event = ServerEvent::PermissionChanged {
            target_user_id: *target,
            permission,
        };
        room.broadcast(&event);
        room.send_to(target, event);

        tracing::info!(
            room_id = %room_id,
            target = %target,
            permission = ?permission,
            "Permission changed"
        );
        Ok(())
    }

    pub async fn post_chat_message(
        &self,
        id: &ConnectionId,
        room_id: &str,
        text: String,
    ) -> Result<ChatMessage> {
        if text.trim().is_empty() {
            return Err(CoordinatorError::malformed("chat message must not be empty"));
        }

        let mut room = self.lock_room(room_id).await?;
        let author = Self::member(&room, id)?.clone();
        let message = room.append_chat(&author, text);
        room.broadcast(&ServerEvent::ChatMessage(message.clone()));

        tracing::debug!(room_id = %room_id, message_id = %message.id, "Chat message posted");
        Ok(message)
    }

    /// Point-to-point forward; returns whether the target was still there.
    pub async fn relay_signal(
        &self,
        kind: SignalKind,
        from: &ConnectionId,
        target: &ConnectionId,
        payload: serde_json::Value,
    ) -> bool {
        let delivered = self
            .connections
            .send_to(target, ServerEvent::signal(kind, *from, payload))
            .await;

        if !delivered {
            tracing::debug!(from = %from, target = %target, kind = ?kind, "Signal target gone, dropping");
        }
        delivered
    }

    pub async fn start_call(&self, id: &ConnectionId, room_id: &str) -> Result<()> {
        let room = self.lock_room(room_id).await?;
        let initiator = Self::member(&room, id)?.name.clone();

        room.broadcast_except(
            id,
            &ServerEvent::CallStarted {
                initiator: initiator.clone(),
                participant_id: *id,
            },
        );
        tracing::info!(room_id = %room_id, initiator = %initiator, "Video call started");
        Ok(())
    }

    pub async fn end_call(&self, id: &ConnectionId, room_id: &str) -> Result<()> {
        let room = self.lock_room(room_id).await?;
        Self::member(&room, id)?;

        room.broadcast_except(id, &ServerEvent::CallEnded { participant_id: *id });
        tracing::info!(room_id = %room_id, connection_id = %id, "Video call ended");
        Ok(())
    }

    /// Runs code through the judge and shows the result to the whole room.
    /// No room lock is held while the judge works.
    pub async fn execute_code(
        &self,
        id: &ConnectionId,
        room_id: &str,
        script: String,
        language: String,
    ) -> Result<ExecutionResult> {
        let shared = self.room_handle(room_id).await?;
        let requested_by = {
            let room = shared.lock().await;
            if room.is_closed() {
                return Err(CoordinatorError::RoomNotFound(room_id.to_string()));
            }
            Self::member(&room, id)?.name.clone()
        };

        tracing::info!(room_id = %room_id, language = %language, user = %requested_by, "Executing code");

        let request = ExecutionRequest { script, language };
        let outcome = match tokio::time::timeout(self.judge_timeout, self.judge.execute(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CoordinatorError::Timeout("judge request".to_string())),
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(room_id = %room_id, error = %e, "Code execution failed");
                ExecutionResult::from_error(&e)
            }
        };

        let room = shared.lock().await;
        if room.is_closed() {
            tracing::debug!(room_id = %room_id, "Room closed before execution finished");
        } else {
            room.broadcast(&ServerEvent::ExecutionResult(result.clone()));
        }

        Ok(result)
    }

    pub async fn schedule_session(
        &self,
        id: &ConnectionId,
        room_id: &str,
        title: String,
        description: String,
        time: String,
    ) -> Result<ScheduledSession> {
        if title.trim().is_empty() || time.trim().is_empty() {
            return Err(CoordinatorError::malformed("title and time are required"));
        }

        let room = self.lock_room(room_id).await?;
        let participant = Self::member(&room, id)?;
        if !participant.is_host() {
            return Err(CoordinatorError::unauthorized("schedule sessions"));
        }

        let session = self
            .schedule
            .add(room_id.to_string(), title, description, time, participant.name.clone())
            .await;
        room.broadcast(&ServerEvent::SessionScheduled(session.clone()));

        tracing::info!(room_id = %room_id, session_id = %session.id, "Session scheduled");
        Ok(session)
    }

    pub async fn list_scheduled_sessions(&self, id: &ConnectionId, room_id: &str) -> Vec<ScheduledSession> {
        let sessions = self.schedule.for_room(room_id).await;
        self.connections
            .send_to(id, ServerEvent::ScheduledSessions { sessions: sessions.clone() })
            .await;
        sessions
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.lock_room(room_id).await.is_ok()
    }

    pub async fn room_summary(&self, room_id: &str) -> Option<RoomSummary> {
        self.lock_room(room_id).await.ok().map(|room| room.summary())
    }

    #[cfg(test)]
    async fn participant(&self, room_id: &str, id: &ConnectionId) -> Option<Participant> {
        let room = self.lock_room(room_id).await.ok()?;
        room.participant(id).cloned()
    }

    #[cfg(test)]
    async fn document(&self, room_id: &str) -> Option<(String, String)> {
        let room = self.lock_room(room_id).await.ok()?;
        Some((room.document().to_string(), room.language().to_string()))
    }

    pub async fn room_count(&self) -> usize {
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        let mut count = 0;
        for room in rooms {
            if !room.lock().await.is_closed() {
                count += 1;
            }
        }
        count
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    pub async fn participant_count(&self) -> usize {
        self.connections.participant_count().await
    }

    /// Hands out a short code for a new session. No room is created until a
    /// host joins with it.
    pub async fn allocate_session_code(&self) -> String {
        loop {
            let code = generate_session_code();
            if !self.rooms.read().await.contains_key(&code) {
                return code;
            }
        }
    }
}

/// First hex digits of a v4 UUID, upper-cased.
fn generate_session_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(SESSION_CODE_LEN);
    code.to_ascii_uppercase()
}
