// Integration tests for the code sync server
// Each test starts the real routes on an ephemeral port and talks to them over HTTP and WebSocket

use std::net::SocketAddr;
use std::sync::Arc;

use codesync_server::api;
use codesync_server::collab::Coordinator;
use codesync_server::error::Result;
use codesync_server::judge::{ExecutionRequest, ExecutionResult, Judge};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Judge that echoes the submitted script back as program output
struct EchoJudge;

impl Judge for EchoJudge {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'_, Result<ExecutionResult>> {
        Box::pin(async move {
            Ok(ExecutionResult {
                output: format!("{}:{}", request.language, request.script),
                error: String::new(),
                time: "0.01".to_string(),
                memory: "1024".to_string(),
            })
        })
    }
}

fn start_server() -> SocketAddr {
    let coordinator = Coordinator::new(Arc::new(EchoJudge), Duration::from_secs(2));
    let routes = api::routes(coordinator, None);
    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn connect(addr: SocketAddr) -> Ws {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("WebSocket connection failed");

    // the first frame on every connection announces its id
    let first = next_event(&mut ws).await;
    assert_eq!(first["type"], "Connected");
    ws
}

async fn send(ws: &mut Ws, command: Value) {
    ws.send(Message::Text(command.to_string())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let message = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream closed")
            .expect("WebSocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skips events until one with the given type arrives.
async fn wait_for(ws: &mut Ws, event_type: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == event_type {
            return event;
        }
    }
}

async fn join(ws: &mut Ws, room_id: &str, name: &str, role: &str) -> Value {
    send(ws, json!({ "type": "Join", "room_id": room_id, "display_name": name, "role": role })).await;
    wait_for(ws, "RoomSnapshot").await
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_server();

    let resp = reqwest::get(format!("http://{}/api/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200, "Health endpoint should return 200 OK");

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_rooms"], 0);
}

#[tokio::test]
async fn test_host_creates_room() {
    let addr = start_server();
    let mut host = connect(addr).await;

    let snapshot = join(&mut host, "ABCD", "Hana", "host").await;
    assert_eq!(snapshot["room_id"], "ABCD");
    assert_eq!(snapshot["document"], "");
    assert_eq!(snapshot["language"], "javascript");
    assert_eq!(snapshot["participant"]["role"], "host");
    assert_eq!(snapshot["participant"]["permission"], "editor");

    let roster = wait_for(&mut host, "RosterChanged").await;
    assert_eq!(roster["change"]["kind"], "Joined");
    assert_eq!(roster["participants"].as_array().unwrap().len(), 1);

    let resp = reqwest::get(format!("http://{}/api/rooms/ABCD", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user_count"], 1);
}

#[tokio::test]
async fn test_guest_join_missing_room() {
    let addr = start_server();
    let mut guest = connect(addr).await;

    send(&mut guest, json!({ "type": "Join", "room_id": "ZZZZ", "display_name": "Gil", "role": "guest" })).await;

    let event = next_event(&mut guest).await;
    assert_eq!(event["type"], "RoomNotFound");
    assert_eq!(event["room_id"], "ZZZZ");

    let resp = reqwest::get(format!("http://{}/api/rooms/ZZZZ", addr)).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_permission_flow() {
    let addr = start_server();
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    join(&mut host, "ABCD", "Hana", "host").await;
    let snapshot = join(&mut guest, "ABCD", "Gil", "guest").await;
    assert_eq!(snapshot["participant"]["permission"], "viewer");
    let guest_id = snapshot["participant"]["id"].clone();

    // viewer edits are refused and only the sender hears about it
    send(&mut guest, json!({ "type": "EditDocument", "room_id": "ABCD", "text": "blocked" })).await;
    let refused = wait_for(&mut guest, "Error").await;
    assert_eq!(refused["code"], "unauthorized");

    send(
        &mut host,
        json!({ "type": "SetPermission", "room_id": "ABCD", "target_user_id": guest_id, "permission": "editor" }),
    )
    .await;
    let granted = wait_for(&mut guest, "PermissionChanged").await;
    assert_eq!(granted["permission"], "editor");

    send(&mut guest, json!({ "type": "EditDocument", "room_id": "ABCD", "text": "print(1)" })).await;
    let changed = wait_for(&mut host, "DocumentChanged").await;
    assert_eq!(changed["text"], "print(1)");
}

#[tokio::test]
async fn test_language_change_is_host_only() {
    let addr = start_server();
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    join(&mut host, "ABCD", "Hana", "host").await;
    join(&mut guest, "ABCD", "Gil", "guest").await;

    send(&mut guest, json!({ "type": "ChangeLanguage", "room_id": "ABCD", "language": "python3" })).await;
    assert_eq!(wait_for(&mut guest, "Error").await["code"], "unauthorized");

    send(&mut host, json!({ "type": "ChangeLanguage", "room_id": "ABCD", "language": "python3" })).await;
    assert_eq!(wait_for(&mut host, "LanguageChanged").await["language"], "python3");
    assert_eq!(wait_for(&mut guest, "LanguageChanged").await["language"], "python3");
}

#[tokio::test]
async fn test_chat_history_replayed_to_late_joiner() {
    let addr = start_server();
    let mut host = connect(addr).await;

    join(&mut host, "ABCD", "Hana", "host").await;
    send(&mut host, json!({ "type": "PostChat", "room_id": "ABCD", "text": "first" })).await;
    send(&mut host, json!({ "type": "PostChat", "room_id": "ABCD", "text": "second" })).await;
    assert_eq!(wait_for(&mut host, "ChatMessage").await["message"], "first");
    assert_eq!(wait_for(&mut host, "ChatMessage").await["message"], "second");

    let mut guest = connect(addr).await;
    join(&mut guest, "ABCD", "Gil", "guest").await;
    assert_eq!(wait_for(&mut guest, "ChatMessage").await["message"], "first");
    assert_eq!(wait_for(&mut guest, "ChatMessage").await["message"], "second");
}

#[tokio::test]
async fn test_execution_result_reaches_room() {
    let addr = start_server();
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    join(&mut host, "ABCD", "Hana", "host").await;
    join(&mut guest, "ABCD", "Gil", "guest").await;

    send(
        &mut guest,
        json!({ "type": "Execute", "room_id": "ABCD", "text": "print(1)", "language": "python3" }),
    )
    .await;

    for ws in [&mut host, &mut guest] {
        let result = wait_for(ws, "ExecutionResult").await;
        assert_eq!(result["output"], "python3:print(1)");
        assert_eq!(result["time"], "0.01");
    }
}

#[tokio::test]
async fn test_signaling_relayed_to_target_only() {
    let addr = start_server();
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;

    let host_snapshot = join(&mut host, "ABCD", "Hana", "host").await;
    join(&mut guest, "ABCD", "Gil", "guest").await;
    let host_id = host_snapshot["participant"]["id"].clone();

    send(
        &mut guest,
        json!({ "type": "Offer", "target": host_id, "payload": { "sdp": "v=0" } }),
    )
    .await;

    let offer = wait_for(&mut host, "Offer").await;
    assert_eq!(offer["payload"]["sdp"], "v=0");
}

#[tokio::test]
async fn test_room_removed_after_last_disconnect() {
    let addr = start_server();
    let mut host = connect(addr).await;

    join(&mut host, "ABCD", "Hana", "host").await;
    host.close(None).await.unwrap();
    drop(host);

    // cleanup runs once the server notices the closed socket
    let url = format!("http://{}/api/rooms/ABCD", addr);
    let mut status = 200;
    for _ in 0..20 {
        status = reqwest::get(&url).await.unwrap().status().as_u16();
        if status == 404 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, 404, "Room should be gone once empty");
}

#[tokio::test]
async fn test_auto_join_from_query() {
    let addr = start_server();
    let mut host = connect(addr).await;
    join(&mut host, "ABCD", "Hana", "host").await;

    let url = format!("ws://{}/ws?room_id=ABCD&display_name=Gil%20Park&role=guest", addr);
    let (mut guest, _) = connect_async(url).await.unwrap();

    let snapshot = wait_for(&mut guest, "RoomSnapshot").await;
    assert_eq!(snapshot["participant"]["name"], "Gil Park");
    assert_eq!(snapshot["participant"]["role"], "guest");
}

#[tokio::test]
async fn test_explicit_join_after_auto_join_keeps_document() {
    let addr = start_server();
    let url = format!("ws://{}/ws?room_id=ABCD&display_name=Hana&role=host", addr);
    let (mut host, _) = connect_async(url).await.unwrap();
    wait_for(&mut host, "RoomSnapshot").await;

    send(&mut host, json!({ "type": "EditDocument", "room_id": "ABCD", "text": "typed" })).await;
    let snapshot = join(&mut host, "ABCD", "Hana", "host").await;
    assert_eq!(snapshot["document"], "typed");
}

#[tokio::test]
async fn test_malformed_message_reports_error() {
    let addr = start_server();
    let mut ws = connect(addr).await;

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "Error");

    // the connection stays usable afterwards
    let snapshot = join(&mut ws, "ABCD", "Hana", "host").await;
    assert_eq!(snapshot["room_id"], "ABCD");
}

#[tokio::test]
async fn test_create_session_endpoint() {
    let addr = start_server();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/create-session", addr))
        .json(&json!({ "user_name": "Hana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    let room_id = body["room_id"].as_str().unwrap();
    assert_eq!(room_id.len(), 8);
    assert!(body["join_url"].as_str().unwrap().contains(room_id));
}
