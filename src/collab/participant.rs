use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifies one live transport connection; doubles as the participant id.
pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Viewer,
    Editor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ConnectionId,
    pub name: String,
    pub role: Role,
    pub permission: Permission,
    pub is_online: bool,
    pub joined_at: u64,
}

impl Participant {
    /// Hosts start as editors; guests start as viewers until a host grants more.
    pub fn new(id: ConnectionId, name: String, role: Role) -> Self {
        let permission = match role {
            Role::Host => Permission::Editor,
            Role::Guest => Permission::Viewer,
        };

        Self {
            id,
            name,
            role,
            permission,
            is_online: true,
            joined_at: now_millis(),
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn can_edit(&self) -> bool {
        self.role == Role::Host || self.permission == Permission::Editor
    }

    /// Returns false without touching anything when the target is a host.
    pub fn set_permission(&mut self, permission: Permission) -> bool {
        if self.is_host() {
            return false;
        }
        self.permission = permission;
        true
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_permissions() {
        let host = Participant::new(Uuid::new_v4(), "Hana".to_string(), Role::Host);
        let guest = Participant::new(Uuid::new_v4(), "Gil".to_string(), Role::Guest);

        assert_eq!(host.permission, Permission::Editor);
        assert!(host.can_edit());
        assert_eq!(guest.permission, Permission::Viewer);
        assert!(!guest.can_edit());
    }

    #[test]
    fn test_host_permission_is_immutable() {
        let mut host = Participant::new(Uuid::new_v4(), "Hana".to_string(), Role::Host);
        assert!(!host.set_permission(Permission::Viewer));
        assert_eq!(host.permission, Permission::Editor);
        assert!(host.can_edit());
    }

    #[test]
    fn test_guest_grant_and_revoke() {
        let mut guest = Participant::new(Uuid::new_v4(), "Gil".to_string(), Role::Guest);

        assert!(guest.set_permission(Permission::Editor));
        assert!(guest.can_edit());

        // repeating the same grant is accepted
        assert!(guest.set_permission(Permission::Editor));
        assert!(guest.can_edit());

        assert!(guest.set_permission(Permission::Viewer));
        assert!(!guest.can_edit());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Host).unwrap(), "\"host\"");
        let permission: Permission = serde_json::from_str("\"editor\"").unwrap();
        assert_eq!(permission, Permission::Editor);
        assert!(serde_json::from_str::<Role>("\"admin\"").is_err());
    }
}
