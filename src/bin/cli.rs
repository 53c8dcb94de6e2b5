// Code sync server CLI validation tool
// Checks the HTTP endpoints and drives rooms over the WebSocket protocol

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::{self, Write};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Parser)]
#[command(name = "codesync-cli")]
#[command(about = "Code sync server CLI validation tool", long_about = None)]
struct Cli {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:3001")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Look up a room's metadata
    Room {
        /// Room ID
        room_id: String,
    },

    /// Allocate a new session code
    CreateSession {
        /// Host display name
        #[arg(short, long)]
        name: String,
    },

    /// Open (or attach to) a room as host
    Host {
        #[arg(short, long)]
        room_id: String,

        #[arg(short, long)]
        name: String,

        /// Keep connection alive and print room traffic (Ctrl+C to exit)
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Join an existing room as guest
    Join {
        #[arg(short, long)]
        room_id: String,

        #[arg(short, long)]
        name: String,

        /// Keep connection alive and print room traffic (Ctrl+C to exit)
        #[arg(short, long)]
        keep_alive: bool,
    },

    /// Run automated validation scenarios
    Validate {
        /// Run all validation tests
        #[arg(short, long)]
        all: bool,

        /// Test specific scenario
        #[arg(short, long)]
        scenario: Option<String>,
    },

    /// Interactive mode - send raw JSON commands
    Interactive,
}

const SCENARIOS: &[(&str, &str)] = &[
    ("connection", "Basic WebSocket connection test"),
    ("host-room", "Host creates a room and receives a snapshot"),
    ("invalid-room", "Guest join to a missing room is refused"),
    ("permission-flow", "Viewer edit rejected, then allowed after grant"),
    ("chat-broadcast", "Chat reaches every participant including the sender"),
    ("cleanup", "Room disappears when its last participant leaves"),
];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::Room { room_id } => lookup_room(&cli.server, room_id).await,
        Commands::CreateSession { name } => create_session(&cli.server, name).await,
        Commands::Host { room_id, name, keep_alive } => {
            attach(&cli.server, room_id, name, "host", *keep_alive).await
        }
        Commands::Join { room_id, name, keep_alive } => {
            attach(&cli.server, room_id, name, "guest", *keep_alive).await
        }
        Commands::Validate { all, scenario } => {
            if *all {
                run_all_validations(&cli.server).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli.server, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
        Commands::Interactive => interactive_mode(&cli.server).await,
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/api/health", server);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Health check passed", "✓".green());
            if let Ok(body) = resp.json::<Value>().await {
                println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                println!("  Rooms: {}", body["active_rooms"]);
                println!("  Connections: {}", body["active_connections"]);
                println!("  Participants: {}", body["active_participants"]);
            }
        }
        Ok(resp) => println!("{} Health check failed: {}", "✗".red(), resp.status()),
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn lookup_room(server: &str, room_id: &str) {
    let url = format!("http://{}/api/rooms/{}", server, urlencoding::encode(room_id));
    match reqwest::get(&url).await {
        Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
            println!("{} Room {} not found", "✗".yellow(), room_id.bold());
        }
        Ok(resp) => match resp.json::<Value>().await {
            Ok(body) => {
                println!("{} Room {}", "✓".green(), room_id.green().bold());
                println!("  Users: {}", body["user_count"]);
                println!("  Language: {}", body["language"].as_str().unwrap_or("unknown"));
            }
            Err(e) => println!("{} Unexpected response: {}", "✗".red(), e),
        },
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn create_session(server: &str, name: &str) {
    let url = format!("http://{}/api/create-session", server);
    let client = reqwest::Client::new();

    match client.post(&url).json(&json!({ "user_name": name })).send().await {
        Ok(resp) => match resp.json::<Value>().await {
            Ok(body) if body["room_id"].is_string() => {
                println!("{} Session code allocated", "✓".green());
                println!("\n{}", "═".repeat(50).green());
                println!("{} {}", "Room ID:".bold(), body["room_id"].as_str().unwrap_or("").green().bold());
                println!("{} {}", "Join URL:".bold(), body["join_url"].as_str().unwrap_or(""));
                println!("{}", "═".repeat(50).green());
            }
            Ok(body) => println!("{} {}", "✗".red(), body["error"]),
            Err(e) => println!("{} Unexpected response: {}", "✗".red(), e),
        },
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn attach(server: &str, room_id: &str, name: &str, role: &str, keep_alive: bool) {
    println!("{} {} as {}...", "Joining room".cyan(), room_id.bold(), role);

    // use the auto-join query so the join happens during the handshake
    let url = format!(
        "ws://{}/ws?room_id={}&display_name={}&role={}",
        server,
        urlencoding::encode(room_id),
        urlencoding::encode(name),
        role
    );

    let mut ws = match connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            return;
        }
    };

    match wait_for_any(&mut ws, &["RoomSnapshot", "RoomNotFound", "Error"], 5).await {
        Some(event) if event["type"] == "RoomSnapshot" => {
            println!("{} Joined room {}", "✓".green(), room_id.green().bold());
            println!("  Participant ID: {}", event["participant"]["id"]);
            println!("  Language: {}", event["language"].as_str().unwrap_or(""));
            println!("  Document: {} bytes", event["document"].as_str().map(str::len).unwrap_or(0));
        }
        Some(event) if event["type"] == "RoomNotFound" => {
            println!("{} Room {} does not exist; a host must create it first", "✗".red(), room_id);
            return;
        }
        Some(event) => {
            println!("{} {}", "✗".red(), event["message"]);
            return;
        }
        None => {
            println!("{} Timeout waiting for snapshot", "✗".red());
            return;
        }
    }

    if !keep_alive {
        println!("\n{}", "⚠ Connection closed. You have left the room.".yellow());
        println!("Use {} to stay in the room.", "--keep-alive".cyan());
        return;
    }

    println!("\n{}", "Connection is being kept alive...".yellow());
    println!("Press {} to disconnect.", "Ctrl+C".bold());
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => println!("{} {}", "◀".green(), text.bright_white()),
            Ok(Message::Close(_)) => {
                println!("{} Server closed the connection", "✗".yellow());
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                println!("{} Connection error: {}", "✗".red(), e);
                break;
            }
        }
    }
}

async fn connect(server: &str) -> Option<Ws> {
    let url = format!("ws://{}/ws", server);
    match connect_async(&url).await {
        Ok((ws, _)) => Some(ws),
        Err(e) => {
            println!("{} Connection failed: {}", "✗".red(), e);
            None
        }
    }
}

async fn send(ws: &mut Ws, command: Value) -> bool {
    ws.send(Message::Text(command.to_string())).await.is_ok()
}

/// Reads frames until one of the wanted event types shows up.
async fn wait_for_any(ws: &mut Ws, types: &[&str], secs: u64) -> Option<Value> {
    let deadline = Instant::now() + Duration::from_secs(secs);

    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match timeout(remaining, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let Ok(event) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if types.iter().any(|t| event["type"] == *t) {
                    return Some(event);
                }
            }
            Ok(Some(Ok(_))) => continue,
            _ => return None,
        }
    }
}

async fn wait_for(ws: &mut Ws, event_type: &str, secs: u64) -> Option<Value> {
    wait_for_any(ws, &[event_type], secs).await
}

async fn join(ws: &mut Ws, room_id: &str, name: &str, role: &str) -> Option<Value> {
    let command = json!({ "type": "Join", "room_id": room_id, "display_name": name, "role": role });
    if !send(ws, command).await {
        return None;
    }
    wait_for(ws, "RoomSnapshot", 3).await
}

fn scratch_room() -> String {
    format!("VAL{}", rand::random::<u32>() % 1_000_000)
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    for (name, description) in SCENARIOS {
        println!("  {} - {}", name.cyan(), description);
    }
    println!("\nExample: codesync-cli validate --scenario permission-flow");
}

async fn run_scenario(server: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    let result = match scenario {
        "connection" => validate_connection(server).await,
        "host-room" => validate_host_room(server).await,
        "invalid-room" => validate_invalid_room(server).await,
        "permission-flow" => validate_permission_flow(server).await,
        "chat-broadcast" => validate_chat_broadcast(server).await,
        "cleanup" => validate_cleanup(server).await,
        _ => {
            println!("{} Unknown scenario: {}", "✗".red(), scenario);
            list_scenarios();
            return;
        }
    };

    if result {
        println!("\n{} Scenario passed", "✓".green().bold());
    } else {
        println!("\n{} Scenario failed", "✗".red().bold());
    }
}

async fn run_all_validations(server: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    for (name, _) in SCENARIOS {
        println!("{} {}", "▶".cyan(), name.bold());
        let ok = match *name {
            "connection" => validate_connection(server).await,
            "host-room" => validate_host_room(server).await,
            "invalid-room" => validate_invalid_room(server).await,
            "permission-flow" => validate_permission_flow(server).await,
            "chat-broadcast" => validate_chat_broadcast(server).await,
            "cleanup" => validate_cleanup(server).await,
            _ => false,
        };
        if ok {
            passed += 1;
        }
        println!();
    }

    let summary = format!("{}/{} scenarios passed", passed, SCENARIOS.len());
    if passed == SCENARIOS.len() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
}

async fn validate_connection(server: &str) -> bool {
    let Some(mut ws) = connect(server).await else {
        return false;
    };

    match wait_for(&mut ws, "Connected", 3).await {
        Some(event) => {
            println!("{} Connected as {}", "✓".green(), event["connection_id"]);
            true
        }
        None => {
            println!("{} No Connected event received", "✗".red());
            false
        }
    }
}

async fn validate_host_room(server: &str) -> bool {
    let Some(mut ws) = connect(server).await else {
        return false;
    };
    let room = scratch_room();

    match join(&mut ws, &room, "Validator", "host").await {
        Some(snapshot) if snapshot["participant"]["role"] == "host" => {
            println!("{} Room {} created, language {}", "✓".green(), room, snapshot["language"]);
            true
        }
        _ => {
            println!("{} No snapshot for host", "✗".red());
            false
        }
    }
}

async fn validate_invalid_room(server: &str) -> bool {
    let Some(mut ws) = connect(server).await else {
        return false;
    };
    let room = scratch_room();

    let command = json!({ "type": "Join", "room_id": room, "display_name": "Ghost", "role": "guest" });
    if !send(&mut ws, command).await {
        return false;
    }

    match wait_for_any(&mut ws, &["RoomNotFound", "RoomSnapshot"], 3).await {
        Some(event) if event["type"] == "RoomNotFound" => {
            println!("{} Guest refused for missing room", "✓".green());
            true
        }
        _ => {
            println!("{} Expected RoomNotFound", "✗".red());
            false
        }
    }
}

async fn validate_permission_flow(server: &str) -> bool {
    let (Some(mut host), Some(mut guest)) = (connect(server).await, connect(server).await) else {
        return false;
    };
    let room = scratch_room();

    if join(&mut host, &room, "Host", "host").await.is_none() {
        println!("{} Host could not create room", "✗".red());
        return false;
    }
    let Some(snapshot) = join(&mut guest, &room, "Guest", "guest").await else {
        println!("{} Guest could not join", "✗".red());
        return false;
    };
    let guest_id = snapshot["participant"]["id"].clone();

    println!("  Step 1: viewer edit should be refused...");
    send(&mut guest, json!({ "type": "EditDocument", "room_id": room, "text": "blocked" })).await;
    match wait_for(&mut guest, "Error", 3).await {
        Some(event) if event["code"] == "unauthorized" => println!("{} Edit refused", "✓".green()),
        _ => {
            println!("{} Viewer edit was not refused", "✗".red());
            return false;
        }
    }

    println!("  Step 2: host grants editor...");
    send(
        &mut host,
        json!({ "type": "SetPermission", "room_id": room, "target_user_id": guest_id, "permission": "editor" }),
    )
    .await;
    if wait_for(&mut guest, "PermissionChanged", 3).await.is_none() {
        println!("{} Guest never saw the grant", "✗".red());
        return false;
    }

    println!("  Step 3: editor edit reaches host...");
    send(&mut guest, json!({ "type": "EditDocument", "room_id": room, "text": "print(1)" })).await;
    match wait_for(&mut host, "DocumentChanged", 3).await {
        Some(event) if event["text"] == "print(1)" => {
            println!("{} Edit broadcast to host", "✓".green());
            true
        }
        _ => {
            println!("{} Host did not receive the edit", "✗".red());
            false
        }
    }
}

async fn validate_chat_broadcast(server: &str) -> bool {
    let (Some(mut host), Some(mut guest)) = (connect(server).await, connect(server).await) else {
        return false;
    };
    let room = scratch_room();

    if join(&mut host, &room, "Host", "host").await.is_none()
        || join(&mut guest, &room, "Guest", "guest").await.is_none()
    {
        return false;
    }

    send(&mut guest, json!({ "type": "PostChat", "room_id": room, "text": "hello" })).await;

    let host_saw = wait_for(&mut host, "ChatMessage", 3).await;
    let guest_saw = wait_for(&mut guest, "ChatMessage", 3).await;
    match (host_saw, guest_saw) {
        (Some(a), Some(b)) if a["id"] == b["id"] => {
            println!("{} Both participants received message {}", "✓".green(), a["id"]);
            true
        }
        _ => {
            println!("{} Chat message was not seen by everyone", "✗".red());
            false
        }
    }
}

async fn validate_cleanup(server: &str) -> bool {
    let Some(mut host) = connect(server).await else {
        return false;
    };
    let room = scratch_room();

    if join(&mut host, &room, "Host", "host").await.is_none() {
        return false;
    }
    let _ = host.close(None).await;
    drop(host);

    // give the server a moment to run its cleanup
    tokio::time::sleep(Duration::from_millis(300)).await;

    let url = format!("http://{}/api/rooms/{}", server, room);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
            println!("{} Room {} removed after last leave", "✓".green(), room);
            true
        }
        Ok(resp) => {
            println!("{} Room still present ({})", "✗".red(), resp.status());
            false
        }
        Err(e) => {
            println!("{} Cannot reach server: {}", "✗".red(), e);
            false
        }
    }
}

async fn interactive_mode(server: &str) {
    println!("\n{}", "Interactive Mode".bold().green());
    println!("{}", "═".repeat(60).green());
    println!("Type {} for help, {} to quit\n", "help".cyan(), "quit".cyan());

    let Some(ws) = connect(server).await else {
        return;
    };
    println!("{} Connected to server", "✓".green());

    let (mut write, mut read) = ws.split();

    let receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                println!("\n{} {}", "◀".green(), text.bright_white());
            }
        }
    });

    loop {
        print!("{} ", "►".cyan());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }
        if input == "help" {
            print_interactive_help();
            continue;
        }

        if let Ok(parsed) = serde_json::from_str::<Value>(input) {
            if write.send(Message::Text(parsed.to_string())).await.is_ok() {
                println!("{} Message sent", "✓".green());
            } else {
                println!("{} Failed to send message", "✗".red());
                break;
            }
        } else {
            println!("{} Invalid JSON. Type 'help' for examples.", "✗".yellow());
        }
    }

    receive_task.abort();
}

fn print_interactive_help() {
    println!("\n{}", "Interactive Mode Commands".bold());
    println!("{}", "─".repeat(60));
    println!("Send JSON messages directly to the server.\n");

    println!("{}:", "Join as host".cyan());
    println!(r#"  {{"type":"Join","room_id":"ABCD","display_name":"Hana","role":"host"}}"#);

    println!("\n{}:", "Edit document".cyan());
    println!(r#"  {{"type":"EditDocument","room_id":"ABCD","text":"print(1)"}}"#);

    println!("\n{}:", "Change language (host only)".cyan());
    println!(r#"  {{"type":"ChangeLanguage","room_id":"ABCD","language":"python3"}}"#);

    println!("\n{}:", "Chat".cyan());
    println!(r#"  {{"type":"PostChat","room_id":"ABCD","text":"hello"}}"#);

    println!("\n{}:", "Grant editor (host only)".cyan());
    println!(r#"  {{"type":"SetPermission","room_id":"ABCD","target_user_id":"<id>","permission":"editor"}}"#);

    println!("\n{}:", "Run code".cyan());
    println!(r#"  {{"type":"Execute","room_id":"ABCD","text":"print(1)","language":"python3"}}"#);

    println!("\n{}: quit, exit", "Commands".bold());
    println!();
}
