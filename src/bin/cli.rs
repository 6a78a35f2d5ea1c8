// Signaling relay CLI validation tool
// Exercises a running relay through its HTTP endpoints and WebSocket protocol

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::{self, Write};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SCENARIOS: &[&str] = &[
    "connection",
    "handshake",
    "host",
    "offer-accept",
    "double-accept",
    "no-provider",
    "create-taken",
    "relay",
    "leave",
];

#[derive(Parser)]
#[command(name = "signal-cli")]
#[command(about = "Signaling relay CLI validation tool", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Get server configuration
    Config,

    /// Test WebSocket connection and handshake
    Connect,

    /// Host a room as provider and accept every patient that asks to join
    Host {
        /// Room name
        #[arg(short, long)]
        room: String,

        /// Do not accept patients automatically
        #[arg(long)]
        manual: bool,
    },

    /// Ask to join a room as patient and wait for the outcome
    Request {
        /// Room name
        #[arg(short, long)]
        room: String,

        /// Seconds to wait for a provider to accept
        #[arg(short, long, default_value_t = 60)]
        wait: u64,
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

    /// Interactive mode - send custom messages
    Interactive,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Config => {
            check_config(&cli.server).await;
        }
        Commands::Connect => {
            test_connection(&cli.server).await;
        }
        Commands::Host { room, manual } => {
            host_room(&cli.server, room, *manual).await;
        }
        Commands::Request { room, wait } => {
            request_room(&cli.server, room, *wait).await;
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
        Commands::Interactive => {
            interactive_mode(&cli.server).await;
        }
    }
}

fn ws_url(server: &str) -> String {
    format!("ws://{}/signal", server)
}

/// A connected client with its assigned identity
struct Peer {
    id: String,
    ws: WsStream,
}

impl Peer {
    /// Connect and consume the `connected`, `stunservers` and `turnservers` events
    async fn open(server: &str) -> Option<Peer> {
        let (mut ws, _) = match connect_async(ws_url(server)).await {
            Ok(conn) => conn,
            Err(e) => {
                println!("{} Connection failed: {}", "✗".red(), e);
                return None;
            }
        };

        let connected = next_event(&mut ws, "connected", 3).await?;
        let id = connected["data"]["id"].as_str()?.to_string();
        next_event(&mut ws, "stunservers", 3).await?;
        next_event(&mut ws, "turnservers", 3).await?;

        Some(Peer { id, ws })
    }

    async fn send(&mut self, event: &str, data: Value) -> bool {
        let frame = if data.is_null() {
            json!({ "event": event })
        } else {
            json!({ "event": event, "data": data })
        };
        self.ws.send(Message::Text(frame.to_string())).await.is_ok()
    }

    async fn expect(&mut self, event: &str, secs: u64) -> Option<Value> {
        next_event(&mut self.ws, event, secs).await
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Read frames until one carries `event`, or give up after `secs`
async fn next_event(ws: &mut WsStream, event: &str, secs: u64) -> Option<Value> {
    let deadline = Instant::now() + Duration::from_secs(secs);

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                    if frame["event"] == event {
                        return Some(frame);
                    }
                }
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => return None,
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/signal/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                    println!("  Clients: {}", body["clients"]);
                    println!("  Rooms: {}", body["rooms"]);
                    println!("  Pending: {}", body["pending"]);
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn check_config(server: &str) {
    println!("{}", "Fetching server configuration...".cyan());

    let url = format!("http://{}/signal/config", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            if resp.status().is_success() {
                println!("{} Config endpoint accessible", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("\nConfiguration:");
                    println!("{:#}", body);
                }
            } else {
                println!("{} Config fetch failed: {}", "✗".red(), resp.status());
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

async fn test_connection(server: &str) {
    println!("{}", "Testing WebSocket connection...".cyan());

    match Peer::open(server).await {
        Some(peer) => {
            println!("{} WebSocket connection established", "✓".green());
            println!("  URL: {}", ws_url(server));
            println!("  Client ID: {}", peer.id.green());
            peer.close().await;
            println!("{} Connection closed cleanly", "✓".green());
        }
        None => {
            println!("{} Handshake not completed", "✗".red());
        }
    }
}

async fn host_room(server: &str, room: &str, manual: bool) {
    println!("{}", "Hosting room...".cyan());
    println!("  Room: {}", room);

    let Some(mut peer) = Peer::open(server).await else {
        return;
    };

    if !peer.send("join", json!({ "name": room, "role": "provider" })).await {
        println!("{} Failed to send join", "✗".red());
        return;
    }

    match peer.expect("join", 5).await {
        Some(reply) => {
            println!("{} Joined as provider", "✓".green());
            println!("\n{}", "═".repeat(50).green());
            println!("{} {}", "Room:".bold(), room.green().bold());
            println!("{} {}", "Client ID:".bold(), peer.id.green());
            println!("{}", "═".repeat(50).green());
            println!("  Outcome: {}", reply["data"]["outcome"]);
        }
        None => {
            println!("{} Timeout waiting for join outcome", "✗".red());
            return;
        }
    }

    println!("\n{}", "Waiting for patients...".yellow());
    println!("Press {} to leave the room.", "Ctrl+C".bold());

    loop {
        match peer.ws.next().await {
            Some(Ok(Message::Text(text))) => {
                println!("{} {}", "◀".green(), text.bright_white());

                let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if frame["event"] != "offer" || manual {
                    continue;
                }

                if let Some(patient) = frame["data"]["id"].as_str() {
                    let patient = patient.to_string();
                    if peer.send("accept", json!({ "id": patient })).await {
                        println!("{} Accepted {}", "✓".green(), patient.cyan());
                    }
                }
            }
            Some(Ok(Message::Close(_))) => {
                println!("{} Server closed the connection", "✗".yellow());
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                println!("{} Connection error: {}", "✗".red(), e);
                break;
            }
            None => {
                println!("{} Connection closed", "✗".yellow());
                break;
            }
        }
    }
}

async fn request_room(server: &str, room: &str, wait: u64) {
    println!("{}", "Requesting to join room...".cyan());
    println!("  Room: {}", room);

    let Some(mut peer) = Peer::open(server).await else {
        return;
    };
    println!("  Client ID: {}", peer.id);

    if !peer.send("join", json!({ "name": room, "role": "patient" })).await {
        println!("{} Failed to send join", "✗".red());
        return;
    }

    println!("Waiting up to {}s for a provider...", wait);

    match peer.expect("join", wait).await {
        Some(reply) => {
            let outcome = &reply["data"]["outcome"];
            match outcome["status"].as_str() {
                Some("admitted") => {
                    println!("{} Admitted", "✓".green());
                    println!("  Room members: {}", outcome["description"]["clients"]);
                }
                Some(status) => println!("{} Join refused: {}", "✗".red(), status),
                None => println!("{} Unexpected reply: {}", "✗".yellow(), reply),
            }
        }
        None => {
            println!("{} No provider accepted in time", "✗".red());
        }
    }

    peer.close().await;
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    println!("  {} - Basic WebSocket connection test", "connection".cyan());
    println!("  {} - Identity and ICE server handshake", "handshake".cyan());
    println!("  {} - Provider opens a room", "host".cyan());
    println!("  {} - Patient offered to provider and accepted", "offer-accept".cyan());
    println!("  {} - Second accept of the same patient fails", "double-accept".cyan());
    println!("  {} - Patient refused when no provider is present", "no-provider".cyan());
    println!("  {} - Creating an occupied room fails", "create-taken".cyan());
    println!("  {} - Messages are relayed with the sender stamped", "relay".cyan());
    println!("  {} - Leaving notifies the rest of the room", "leave".cyan());
    println!("\nExample: signal-cli validate --scenario offer-accept");
}

async fn run_named(server: &str, scenario: &str) -> Option<bool> {
    let result = match scenario {
        "connection" => validate_connection(server).await,
        "handshake" => validate_handshake(server).await,
        "host" => validate_host(server).await,
        "offer-accept" => validate_offer_accept(server).await,
        "double-accept" => validate_double_accept(server).await,
        "no-provider" => validate_no_provider(server).await,
        "create-taken" => validate_create_taken(server).await,
        "relay" => validate_relay(server).await,
        "leave" => validate_leave(server).await,
        _ => return None,
    };
    Some(result)
}

async fn run_scenario(server: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    match run_named(server, scenario).await {
        Some(true) => println!("\n{} Scenario passed", "✓".green().bold()),
        Some(false) => println!("\n{} Scenario failed", "✗".red().bold()),
        None => {
            println!("{} Unknown scenario: {}", "✗".red(), scenario);
            list_scenarios();
        }
    }
}

async fn run_all_validations(server: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    let mut failed = 0;

    for scenario in SCENARIOS {
        println!("\n{} {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        if run_named(server, scenario).await == Some(true) {
            passed += 1;
        } else {
            failed += 1;
        }

        sleep(Duration::from_millis(200)).await;
    }

    println!("\n{}", "═".repeat(60).green());
    println!("{}", "Validation Summary".bold());
    println!("{}", "═".repeat(60).green());
    println!("  {} Passed: {}", "✓".green(), passed.to_string().green());
    println!("  {} Failed: {}", "✗".red(), failed.to_string().red());
    println!("  Total: {}", passed + failed);

    if failed == 0 {
        println!("\n{}", "All validations passed! 🎉".green().bold());
    } else {
        println!("\n{}", "Some validations failed. Check output above.".yellow());
    }
}

fn unique_room(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

async fn validate_connection(server: &str) -> bool {
    match connect_async(ws_url(server)).await {
        Ok((ws_stream, _)) => {
            println!("{} WebSocket connection successful", "✓".green());
            drop(ws_stream);
            true
        }
        Err(e) => {
            println!("{} Connection failed: {}", "✗".red(), e);
            false
        }
    }
}

async fn validate_handshake(server: &str) -> bool {
    match Peer::open(server).await {
        Some(peer) => {
            println!("{} Received identity {}", "✓".green(), peer.id);
            println!("{} Received STUN and TURN server lists", "✓".green());
            peer.close().await;
            true
        }
        None => {
            println!("{} Handshake incomplete", "✗".red());
            false
        }
    }
}

async fn validate_host(server: &str) -> bool {
    let Some(mut provider) = Peer::open(server).await else {
        return false;
    };
    let room = unique_room("host");

    provider.send("join", json!({ "name": room, "role": "provider" })).await;

    let ok = match provider.expect("join", 3).await {
        Some(reply) if reply["data"]["outcome"]["status"] == "admitted" => {
            println!("{} Provider admitted to {}", "✓".green(), room);
            true
        }
        other => {
            println!("{} Unexpected join reply: {:?}", "✗".red(), other);
            false
        }
    };

    provider.close().await;
    ok
}

/// Provider in a fresh room plus a patient whose offer reached the provider
async fn provider_with_offer(server: &str) -> Option<(Peer, Peer, String)> {
    let room = unique_room("clinic");

    println!("  Step 1: Provider joins {}...", room);
    let mut provider = Peer::open(server).await?;
    provider.send("join", json!({ "name": room, "role": "provider" })).await;
    provider.expect("join", 3).await?;

    println!("  Step 2: Patient asks to join...");
    let mut patient = Peer::open(server).await?;
    patient.send("join", json!({ "name": room, "role": "patient" })).await;

    let offer = provider.expect("offer", 3).await?;
    if offer["data"]["id"] != patient.id.as_str() {
        println!("{} Offer names the wrong client: {}", "✗".red(), offer);
        return None;
    }
    println!("{} Provider received offer", "✓".green());

    Some((provider, patient, room))
}

async fn validate_offer_accept(server: &str) -> bool {
    let Some((mut provider, mut patient, _)) = provider_with_offer(server).await else {
        println!("{} Offer not delivered", "✗".red());
        return false;
    };

    println!("  Step 3: Provider accepts...");
    let patient_id = patient.id.clone();
    provider.send("accept", json!({ "id": patient_id })).await;

    let accepted = matches!(
        provider.expect("accept", 3).await,
        Some(reply) if reply["data"].get("error").is_none()
    );
    let admitted = match patient.expect("join", 3).await {
        Some(reply) => {
            let outcome = &reply["data"]["outcome"];
            outcome["status"] == "admitted"
                && outcome["description"]["clients"].get(&provider.id).is_some()
        }
        None => false,
    };

    if accepted && admitted {
        println!("{} Patient admitted and sees the provider", "✓".green());
    } else {
        println!("{} accepted={} admitted={}", "✗".red(), accepted, admitted);
    }

    provider.close().await;
    patient.close().await;
    accepted && admitted
}

async fn validate_double_accept(server: &str) -> bool {
    let Some((mut provider, patient, _)) = provider_with_offer(server).await else {
        return false;
    };

    let patient_id = patient.id.clone();
    provider.send("accept", json!({ "id": patient_id })).await;
    let first = provider.expect("accept", 3).await;
    provider.send("accept", json!({ "id": patient_id })).await;
    let second = provider.expect("accept", 3).await;

    let ok = matches!(&first, Some(r) if r["data"].get("error").is_none())
        && matches!(&second, Some(r) if r["data"]["error"] == "notFound");

    if ok {
        println!("{} Second accept rejected with notFound", "✓".green());
    } else {
        println!("{} Replies: {:?} / {:?}", "✗".red(), first, second);
    }

    provider.close().await;
    patient.close().await;
    ok
}

async fn validate_no_provider(server: &str) -> bool {
    let Some(mut patient) = Peer::open(server).await else {
        return false;
    };

    patient
        .send("join", json!({ "name": unique_room("empty"), "role": "patient" }))
        .await;

    let ok = matches!(
        patient.expect("join", 3).await,
        Some(reply) if reply["data"]["outcome"]["status"] == "noProvider"
    );

    if ok {
        println!("{} Patient refused with noProvider", "✓".green());
    } else {
        println!("{} Expected a noProvider outcome", "✗".red());
    }

    patient.close().await;
    ok
}

async fn validate_create_taken(server: &str) -> bool {
    let (Some(mut owner), Some(mut other)) = (Peer::open(server).await, Peer::open(server).await)
    else {
        return false;
    };
    let room = unique_room("created");

    owner.send("create", json!({ "name": room })).await;
    let created = matches!(
        owner.expect("create", 3).await,
        Some(reply) if reply["data"]["name"] == room.as_str() && reply["data"].get("error").is_none()
    );

    other.send("create", json!({ "name": room })).await;
    let taken = matches!(
        other.expect("create", 3).await,
        Some(reply) if reply["data"]["error"] == "taken"
    );

    if created && taken {
        println!("{} Room created once, second create reported taken", "✓".green());
    } else {
        println!("{} created={} taken={}", "✗".red(), created, taken);
    }

    owner.close().await;
    other.close().await;
    created && taken
}

async fn validate_relay(server: &str) -> bool {
    let (Some(mut alice), Some(mut bob)) = (Peer::open(server).await, Peer::open(server).await)
    else {
        return false;
    };

    let bob_id = bob.id.clone();
    alice
        .send(
            "message",
            json!({ "to": bob_id, "type": "offer", "payload": { "sdp": "v=0" } }),
        )
        .await;

    let ok = match bob.expect("message", 3).await {
        Some(frame) => {
            frame["data"]["from"] == alice.id.as_str() && frame["data"]["payload"]["sdp"] == "v=0"
        }
        None => false,
    };

    if ok {
        println!("{} Message relayed with sender stamped", "✓".green());
    } else {
        println!("{} Relayed message missing or malformed", "✗".red());
    }

    alice.close().await;
    bob.close().await;
    ok
}

async fn validate_leave(server: &str) -> bool {
    let Some((mut provider, mut patient, _)) = provider_with_offer(server).await else {
        return false;
    };

    let patient_id = patient.id.clone();
    provider.send("accept", json!({ "id": patient_id })).await;
    if patient.expect("join", 3).await.is_none() {
        return false;
    }

    patient.send("leave", json!(null)).await;

    let ok = matches!(
        provider.expect("removed", 3).await,
        Some(frame) if frame["data"]["id"] == patient_id.as_str()
    );

    if ok {
        println!("{} Provider notified of departure", "✓".green());
    } else {
        println!("{} No removal notice received", "✗".red());
    }

    provider.close().await;
    patient.close().await;
    ok
}

async fn interactive_mode(server: &str) {
    println!("\n{}", "Interactive Mode".bold().green());
    println!("{}", "═".repeat(60).green());
    println!("Type {} for help, {} to quit\n", "help".cyan(), "quit".cyan());

    match connect_async(ws_url(server)).await {
        Ok((ws_stream, _)) => {
            println!("{} Connected to server", "✓".green());

            let (mut write, mut read) = ws_stream.split();

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
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

fn print_interactive_help() {
    println!("\n{}", "Interactive Mode Commands".bold());
    println!("{}", "─".repeat(60));
    println!("Send JSON frames directly to the server.\n");

    println!("{}", "Example Messages:".bold());
    println!("\n{}:", "Host a room".cyan());
    println!(r#"  {{"event":"join","data":{{"name":"clinic","role":"provider"}}}}"#);

    println!("\n{}:", "Ask to join".cyan());
    println!(r#"  {{"event":"join","data":{{"name":"clinic","role":"patient"}}}}"#);

    println!("\n{}:", "Create a room".cyan());
    println!(r#"  {{"event":"create","data":{{"name":"clinic"}}}}"#);

    println!("\n{}:", "Accept a patient".cyan());
    println!(r#"  {{"event":"accept","data":{{"id":"<client id>"}}}}"#);

    println!("\n{}:", "Relay a message".cyan());
    println!(r#"  {{"event":"message","data":{{"to":"<client id>","type":"offer","payload":{{}}}}}}"#);

    println!("\n{}:", "Screen sharing".cyan());
    println!(r#"  {{"event":"shareScreen"}}  {{"event":"unshareScreen"}}"#);

    println!("\n{}:", "Leave".cyan());
    println!(r#"  {{"event":"leave"}}"#);

    println!("\n{}: quit, exit", "Commands".bold());
    println!();
}
