pub mod connection;
mod coordinator;
pub mod messages;
pub mod participant;
pub mod room;
pub mod schedule;

pub use coordinator::{Coordinator, JoinOutcome};
pub use messages::{ClientCommand, RosterChange, ServerEvent, SignalKind};
pub use participant::{ConnectionId, Participant, Permission, Role};
