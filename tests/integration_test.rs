// Integration tests for the signaling relay
// Each test starts the server in-process on an ephemeral port and talks to it over WebSocket

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use signal_relay::api::routes::routes;
use signal_relay::config::{IceConfig, RoomsConfig};
use signal_relay::turn::{StunServer, TurnServer};
use signal_relay::RelayServer;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(max_clients: Option<usize>) -> (SocketAddr, Arc<RelayServer>) {
    let ice = IceConfig {
        stun_servers: vec![StunServer {
            url: "stun:stun.example.org:3478".to_string(),
        }],
        turn_servers: vec![TurnServer {
            url: "turn:turn.example.org:3478".to_string(),
            secret: "integration".to_string(),
            expiry: None,
        }],
    };
    let server = Arc::new(RelayServer::new(RoomsConfig { max_clients }, ice));

    let (addr, serve) = warp::serve(routes(server.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serve);

    (addr, server)
}

struct TestClient {
    id: String,
    ws: WsStream,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let (mut ws, _) = connect_async(format!("ws://{}/signal", addr))
            .await
            .expect("WebSocket connection failed");

        let connected = recv(&mut ws).await;
        assert_eq!(connected["event"], "connected");
        let id = connected["data"]["id"].as_str().unwrap().to_string();

        assert_eq!(recv(&mut ws).await["event"], "stunservers");
        assert_eq!(recv(&mut ws).await["event"], "turnservers");

        Self { id, ws }
    }

    async fn send(&mut self, frame: Value) {
        self.ws.send(Message::Text(frame.to_string())).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        recv(&mut self.ws).await
    }

    /// Assert nothing arrives for a short while
    async fn assert_silent(&mut self) {
        let next = timeout(Duration::from_millis(200), self.ws.next()).await;
        assert!(next.is_err(), "unexpected frame: {:?}", next);
    }
}

async fn recv(ws: &mut WsStream) -> Value {
    loop {
        let message = timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("WebSocket error");

        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn join(client: &mut TestClient, room: &str, role: &str) {
    client
        .send(json!({ "event": "join", "data": { "name": room, "role": role } }))
        .await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, _server) = start_server(None).await;

    let resp = reqwest::get(format!("http://{}/signal/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Signaling Relay");
}

#[tokio::test]
async fn test_config_endpoint() {
    let (addr, _server) = start_server(Some(3)).await;

    let body: Value = reqwest::get(format!("http://{}/signal/config", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["maxClients"], 3);
    assert_eq!(body["turnServers"][0], "turn:turn.example.org:3478");
    assert!(body.to_string().find("integration").is_none());
}

#[tokio::test]
async fn test_handshake_carries_identity_and_ice() {
    let (addr, server) = start_server(None).await;
    let (mut ws, _) = connect_async(format!("ws://{}/signal", addr)).await.unwrap();

    let connected = recv(&mut ws).await;
    let id = connected["data"]["id"].as_str().unwrap();
    assert!(server.registry().is_connected(id).await);

    let stun = recv(&mut ws).await;
    assert_eq!(stun["data"][0]["url"], "stun:stun.example.org:3478");

    let turn = recv(&mut ws).await;
    let credential = &turn["data"][0];
    assert_eq!(credential["url"], "turn:turn.example.org:3478");
    assert!(credential["username"].as_str().unwrap().parse::<u64>().is_ok());
    assert!(!credential["credential"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_provider_accepts_patient() {
    let (addr, server) = start_server(Some(2)).await;
    let mut provider = TestClient::connect(addr).await;
    let mut patient = TestClient::connect(addr).await;

    join(&mut provider, "clinic", "provider").await;
    let reply = provider.recv().await;
    assert_eq!(reply["event"], "join");
    assert_eq!(reply["data"]["room"], "clinic");
    assert_eq!(reply["data"]["outcome"]["status"], "admitted");

    join(&mut patient, "clinic", "patient").await;
    let offer = provider.recv().await;
    assert_eq!(offer, json!({ "event": "offer", "data": { "id": patient.id } }));
    patient.assert_silent().await;

    provider
        .send(json!({ "event": "accept", "data": { "id": patient.id } }))
        .await;
    let ack = provider.recv().await;
    assert_eq!(ack, json!({ "event": "accept", "data": { "id": patient.id } }));

    let admitted = patient.recv().await;
    assert_eq!(admitted["data"]["outcome"]["status"], "admitted");
    let clients = admitted["data"]["outcome"]["description"]["clients"]
        .as_object()
        .unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[&provider.id]["video"], true);

    assert_eq!(server.members_of("clinic").await.len(), 2);

    // Third client finds the room full
    let mut late = TestClient::connect(addr).await;
    join(&mut late, "clinic", "patient").await;
    let refused = late.recv().await;
    assert_eq!(refused["data"]["outcome"]["status"], "full");
}

#[tokio::test]
async fn test_second_accept_reports_not_found() {
    let (addr, _server) = start_server(None).await;
    let mut provider = TestClient::connect(addr).await;
    let mut patient = TestClient::connect(addr).await;

    join(&mut provider, "clinic", "provider").await;
    provider.recv().await;
    join(&mut patient, "clinic", "patient").await;
    provider.recv().await;

    let accept = json!({ "event": "accept", "data": { "id": patient.id } });
    provider.send(accept.clone()).await;
    assert!(provider.recv().await["data"].get("error").is_none());

    provider.send(accept).await;
    assert_eq!(provider.recv().await["data"]["error"], "notFound");

    assert_eq!(patient.recv().await["data"]["outcome"]["status"], "admitted");
    patient.assert_silent().await;
}

#[tokio::test]
async fn test_patient_without_provider() {
    let (addr, _server) = start_server(None).await;
    let mut patient = TestClient::connect(addr).await;

    join(&mut patient, "nobody-home", "patient").await;

    let reply = patient.recv().await;
    assert_eq!(reply["data"]["outcome"], json!({ "status": "noProvider" }));
}

#[tokio::test]
async fn test_message_relay_stamps_sender() {
    let (addr, _server) = start_server(None).await;
    let mut alice = TestClient::connect(addr).await;
    let mut bob = TestClient::connect(addr).await;

    alice
        .send(json!({
            "event": "message",
            "data": { "to": bob.id, "type": "candidate", "payload": { "candidate": "c1" } }
        }))
        .await;

    let relayed = bob.recv().await;
    assert_eq!(relayed["event"], "message");
    assert_eq!(relayed["data"]["from"], alice.id.as_str());
    assert_eq!(relayed["data"]["type"], "candidate");
    assert_eq!(relayed["data"]["payload"]["candidate"], "c1");
}

#[tokio::test]
async fn test_message_to_departed_client_is_dropped() {
    let (addr, server) = start_server(None).await;
    let mut alice = TestClient::connect(addr).await;
    let bob = TestClient::connect(addr).await;
    let bob_id = bob.id.clone();

    drop(bob);
    for _ in 0..50 {
        if !server.registry().is_connected(&bob_id).await {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(!server.registry().is_connected(&bob_id).await);

    alice
        .send(json!({ "event": "message", "data": { "to": bob_id, "type": "offer" } }))
        .await;

    // Connection stays usable
    alice
        .send(json!({ "event": "create", "data": { "name": "still-here" } }))
        .await;
    assert_eq!(alice.recv().await["data"]["name"], "still-here");
}

#[tokio::test]
async fn test_disconnect_notifies_room() {
    let (addr, server) = start_server(None).await;
    let mut provider = TestClient::connect(addr).await;
    let mut patient = TestClient::connect(addr).await;

    join(&mut provider, "clinic", "provider").await;
    provider.recv().await;
    join(&mut patient, "clinic", "patient").await;
    provider.recv().await;
    provider
        .send(json!({ "event": "accept", "data": { "id": patient.id } }))
        .await;
    provider.recv().await;
    patient.recv().await;

    let patient_id = patient.id.clone();
    drop(patient);

    let removed = provider.recv().await;
    assert_eq!(removed, json!({ "event": "removed", "data": { "id": patient_id } }));
    assert_eq!(server.members_of("clinic").await.len(), 1);
}

#[tokio::test]
async fn test_create_taken() {
    let (addr, _server) = start_server(None).await;
    let mut owner = TestClient::connect(addr).await;
    let mut other = TestClient::connect(addr).await;

    owner
        .send(json!({ "event": "create", "data": { "name": "clinic" } }))
        .await;
    assert_eq!(
        owner.recv().await,
        json!({ "event": "create", "data": { "name": "clinic" } })
    );

    other
        .send(json!({ "event": "create", "data": { "name": "clinic" } }))
        .await;
    assert_eq!(
        other.recv().await,
        json!({ "event": "create", "data": { "name": "clinic", "error": "taken" } })
    );
}

#[tokio::test]
async fn test_create_generates_name() {
    let (addr, server) = start_server(None).await;
    let mut client = TestClient::connect(addr).await;

    client.send(json!({ "event": "create", "data": {} })).await;

    let reply = client.recv().await;
    let name = reply["data"]["name"].as_str().unwrap();
    assert!(!name.is_empty());
    assert_eq!(server.room_of(&client.id).await.as_deref(), Some(name));
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let (addr, _server) = start_server(None).await;
    let mut client = TestClient::connect(addr).await;

    client.send(json!({ "event": "teleport" })).await;
    client.send(json!({ "event": "join", "data": { "name": 7 } })).await;
    client
        .ws
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();

    client
        .send(json!({ "event": "create", "data": { "name": "after-garbage" } }))
        .await;
    assert_eq!(client.recv().await["data"]["name"], "after-garbage");
}
