use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::collab::{ClientCommand, ConnectionId, Coordinator, Role, ServerEvent};
use crate::error::CoordinatorError;

/// Optional query string on the upgrade request: when all three values are
/// present the connection joins immediately, before any frame is read.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AutoJoinQuery {
    pub room_id: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

impl AutoJoinQuery {
    pub fn into_command(self) -> Option<ClientCommand> {
        let role = match self.role.as_deref()? {
            "host" => Role::Host,
            "guest" => Role::Guest,
            other => {
                tracing::warn!(role = %other, "Ignoring auto-join with unknown role");
                return None;
            }
        };

        Some(ClientCommand::Join {
            room_id: self.room_id?,
            display_name: self.display_name?,
            role,
        })
    }
}

pub async fn handle_collab_websocket(
    websocket: WebSocket,
    coordinator: Arc<Coordinator>,
    auto_join: Option<ClientCommand>,
) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let connection_id = coordinator.connect(tx).await;
    tracing::info!(connection_id = %connection_id, "New WebSocket connection established");

    // Spawn task to send events to the client
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::text(text)).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    if let Some(command) = auto_join {
        coordinator.dispatch(connection_id, command).await;
    }

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                if message.is_close() {
                    break;
                }
                handle_websocket_message(&coordinator, connection_id, message).await;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    coordinator.disconnect(&connection_id).await;
    sender_task.abort();
    tracing::info!(connection_id = %connection_id, "WebSocket connection closed");
}

async fn handle_websocket_message(
    coordinator: &Arc<Coordinator>,
    connection_id: ConnectionId,
    message: Message,
) {
    // pings and binary frames carry nothing for us
    let Ok(text) = message.to_str() else {
        return;
    };

    tracing::debug!(connection_id = %connection_id, "Received message: {}", text);

    match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => coordinator.dispatch(connection_id, command).await,
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                raw_message = %text,
                "Failed to parse client message"
            );
            coordinator
                .notify_error(&connection_id, &CoordinatorError::from(e))
                .await;
        }
    }
}
