use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::collab_websocket::{self, AutoJoinQuery};
use crate::collab::participant::now_millis;
use crate::collab::{Coordinator, Role};

#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    #[serde(default, alias = "userName")]
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub room_id: String,
    pub message: String,
    pub join_url: String,
}

/// Every HTTP and WebSocket route the server exposes
pub fn routes(
    coordinator: Arc<Coordinator>,
    public_url: Option<String>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["content-type"]);

    collab_websocket_route(coordinator.clone())
        .or(health_check(coordinator.clone()))
        .or(room_lookup(coordinator.clone()))
        .or(create_session(coordinator.clone(), public_url.clone()))
        .or(join_session(coordinator, public_url))
        .with(cors)
}

pub fn collab_websocket_route(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<AutoJoinQuery>())
        .and(with_coordinator(coordinator))
        .map(|ws: warp::ws::Ws, query: AutoJoinQuery, coordinator: Arc<Coordinator>| {
            ws.on_upgrade(move |websocket| {
                collab_websocket::handle_collab_websocket(websocket, coordinator, query.into_command())
            })
        })
}

pub fn health_check(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "health")
        .and(warp::get())
        .and(with_coordinator(coordinator))
        .and_then(|coordinator: Arc<Coordinator>| async move {
            let body = serde_json::json!({
                "status": "ok",
                "service": "codesync-server",
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": now_millis(),
                "active_rooms": coordinator.room_count().await,
                "active_connections": coordinator.connection_count().await,
                "active_participants": coordinator.participant_count().await,
            });
            Ok::<_, Rejection>(warp::reply::json(&body))
        })
}

pub fn room_lookup(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "rooms" / String)
        .and(warp::get())
        .and(with_coordinator(coordinator))
        .and_then(|room_id: String, coordinator: Arc<Coordinator>| async move {
            let reply = match coordinator.room_summary(&room_id).await {
                Some(summary) => warp::reply::with_status(warp::reply::json(&summary), StatusCode::OK),
                None => not_found(),
            };
            Ok::<_, Rejection>(reply)
        })
}

/// Allocates a code for a new session. The room itself appears when the
/// host connects with it.
pub fn create_session(
    coordinator: Arc<Coordinator>,
    public_url: Option<String>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "create-session")
        .and(warp::post())
        .and(warp::body::json::<SessionRequest>())
        .and(warp::header::optional::<String>("host"))
        .and(with_coordinator(coordinator))
        .and(warp::any().map(move || public_url.clone()))
        .and_then(
            |request: SessionRequest,
             host: Option<String>,
             coordinator: Arc<Coordinator>,
             public_url: Option<String>| async move {
                let Some(user_name) = required_name(request) else {
                    return Ok::<_, Rejection>(name_required());
                };

                let room_id = coordinator.allocate_session_code().await;
                tracing::info!(room_id = %room_id, user_name = %user_name, "Session code allocated");

                let response = SessionResponse {
                    join_url: join_url(public_url.as_deref(), host.as_deref(), &room_id, &user_name, Role::Host),
                    room_id,
                    message: "Session created successfully".to_string(),
                };
                Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::OK))
            },
        )
}

/// Pre-flight check for guests: tells them whether the room is live.
pub fn join_session(
    coordinator: Arc<Coordinator>,
    public_url: Option<String>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "join-session" / String)
        .and(warp::post())
        .and(warp::body::json::<SessionRequest>())
        .and(warp::header::optional::<String>("host"))
        .and(with_coordinator(coordinator))
        .and(warp::any().map(move || public_url.clone()))
        .and_then(
            |code: String,
             request: SessionRequest,
             host: Option<String>,
             coordinator: Arc<Coordinator>,
             public_url: Option<String>| async move {
                let Some(user_name) = required_name(request) else {
                    return Ok::<_, Rejection>(name_required());
                };

                if !coordinator.room_exists(&code).await {
                    return Ok(not_found());
                }

                let response = SessionResponse {
                    join_url: join_url(public_url.as_deref(), host.as_deref(), &code, &user_name, Role::Guest),
                    room_id: code,
                    message: "Ready to join session".to_string(),
                };
                Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::OK))
            },
        )
}

fn required_name(request: SessionRequest) -> Option<String> {
    request
        .user_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn name_required() -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": "User name is required" })),
        StatusCode::BAD_REQUEST,
    )
}

fn not_found() -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": "Room not found" })),
        StatusCode::NOT_FOUND,
    )
}

fn join_url(public_url: Option<&str>, host: Option<&str>, room_id: &str, user_name: &str, role: Role) -> String {
    let base = match (public_url, host) {
        (Some(url), _) => url.to_string(),
        (None, Some(host)) => format!("http://{}", host),
        (None, None) => String::new(),
    };
    let role = match role {
        Role::Host => "host",
        Role::Guest => "guest",
    };

    format!(
        "{}/room/{}?name={}&role={}",
        base,
        urlencoding::encode(room_id),
        urlencoding::encode(user_name),
        role
    )
}

fn with_coordinator(
    coordinator: Arc<Coordinator>,
) -> impl Filter<Extract = (Arc<Coordinator>,), Error = Infallible> + Clone {
    warp::any().map(move || coordinator.clone())
}
