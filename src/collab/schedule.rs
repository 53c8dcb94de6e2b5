use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::participant::now_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub id: Uuid,
    pub room_id: String,
    pub title: String,
    pub description: String,
    pub scheduled_time: String,
    pub created_by: String,
    pub created_at: u64,
    pub participants: Vec<String>,
}

/// Process-local list of scheduled sessions. Nothing is ever evicted.
pub struct SessionSchedule {
    sessions: RwLock<Vec<ScheduledSession>>,
}

impl SessionSchedule {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
        }
    }

    pub async fn add(
        &self,
        room_id: String,
        title: String,
        description: String,
        scheduled_time: String,
        created_by: String,
    ) -> ScheduledSession {
        let session = ScheduledSession {
            id: Uuid::new_v4(),
            room_id,
            title,
            description,
            scheduled_time,
            created_by,
            created_at: now_millis(),
            participants: Vec::new(),
        };

        self.sessions.write().await.push(session.clone());
        session
    }

    pub async fn for_room(&self, room_id: &str) -> Vec<ScheduledSession> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .filter(|session| session.room_id == room_id)
            .cloned()
            .collect()
    }
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_scoped_to_room() {
        let schedule = SessionSchedule::new();
        schedule
            .add("ABCD".into(), "Pairing".into(), "".into(), "2026-10-20T10:00".into(), "Hana".into())
            .await;
        schedule
            .add("WXYZ".into(), "Review".into(), "PR 12".into(), "2026-10-21T09:00".into(), "Ode".into())
            .await;
        schedule
            .add("ABCD".into(), "Retro".into(), "".into(), "2026-10-22T16:00".into(), "Hana".into())
            .await;

        let titles: Vec<String> = schedule
            .for_room("ABCD")
            .await
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Pairing".to_string(), "Retro".to_string()]);
        assert!(schedule.for_room("NONE").await.is_empty());
    }
}
