use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::engine::RelayServer;
use super::registry::{ClientId, EventSender};
use super::room::Role;
use super::waiting::{JoinCallback, JoinOutcome};
use crate::error::{RelayError, Result};
use crate::turn::{StunServer, TurnCredential};

/// Client → server frames: `{"event": "...", "data": ...}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join {
        name: String,
        #[serde(default, deserialize_with = "requested_role")]
        role: Option<Role>,
    },

    Create {
        #[serde(default)]
        name: Option<String>,
    },

    Accept {
        id: ClientId,
    },

    /// Opaque payload addressed with a `to` field
    Message(Map<String, Value>),

    ShareScreen,

    UnshareScreen,

    Leave,

    Trace(Value),
}

/// Server → client frames
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    Connected {
        id: ClientId,
    },

    Stunservers(Vec<StunServer>),

    Turnservers(Vec<TurnCredential>),

    Join {
        room: String,
        outcome: JoinOutcome,
    },

    Create {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Accept {
        id: ClientId,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A patient asks to join the provider's room
    Offer {
        id: ClientId,
    },

    Removed {
        id: ClientId,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },

    Message(Map<String, Value>),
}

impl ServerEvent {
    /// Encode as a text frame
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `patient` asks for admission; any other role string hosts
fn requested_role<'de, D>(deserializer: D) -> std::result::Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let role = Option::<String>::deserialize(deserializer)?;
    Ok(role.map(|r| match r.as_str() {
        "patient" => Role::Patient,
        _ => Role::Provider,
    }))
}

/// Per-connection glue between decoded client events and the relay server
pub struct SignalingHandler {
    server: Arc<RelayServer>,
    client_id: ClientId,
    sender: EventSender,
}

impl SignalingHandler {
    /// Register the connection and queue its handshake events
    pub async fn connect(server: Arc<RelayServer>, sender: EventSender) -> Self {
        let client_id = server.connect(sender.clone()).await;
        Self {
            server,
            client_id,
            sender,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub async fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Join { name, role } => {
                let role = role.unwrap_or(Role::Provider);
                let callback = self.join_reply(name.clone());
                self.server.join(&self.client_id, &name, role, callback).await;
            }

            ClientEvent::Create { name } => {
                let reply = match self.server.create(&self.client_id, name).await {
                    Ok(name) => ServerEvent::Create { name, error: None },
                    Err(RelayError::RoomTaken(name)) => ServerEvent::Create {
                        name,
                        error: Some("taken".to_string()),
                    },
                    Err(e) => {
                        tracing::error!(client_id = %self.client_id, error = %e, "Failed to create room");
                        return;
                    }
                };
                self.reply(reply);
            }

            ClientEvent::Accept { id } => {
                let error = match self.server.accept(&self.client_id, &id).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::info!(
                            client_id = %self.client_id,
                            patient_id = %id,
                            error = %e,
                            "Accept rejected"
                        );
                        Some(e.code().to_string())
                    }
                };
                self.reply(ServerEvent::Accept { id, error });
            }

            ClientEvent::Message(payload) => {
                let Some(to) = payload.get("to").and_then(Value::as_str).map(str::to_owned) else {
                    tracing::debug!(client_id = %self.client_id, "Dropping message without recipient");
                    return;
                };
                self.server.relay().forward(&self.client_id, &to, payload).await;
            }

            ClientEvent::ShareScreen => self.server.share_screen(&self.client_id).await,

            ClientEvent::UnshareScreen => self.server.unshare_screen(&self.client_id).await,

            ClientEvent::Leave => self.server.leave(&self.client_id).await,

            ClientEvent::Trace(data) => log_trace(&self.client_id, &data),
        }
    }

    /// Run the disconnect transition for this connection
    pub async fn cleanup(self) {
        self.server.disconnect(&self.client_id).await;
    }

    fn join_reply(&self, room: String) -> JoinCallback {
        let sender = self.sender.clone();
        Box::new(move |outcome| {
            let _ = sender.send(ServerEvent::Join { room, outcome });
        })
    }

    fn reply(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!(client_id = %self.client_id, "Reply dropped, connection closing");
        }
    }
}

/// WebRTC stats traces are only logged, never interpreted
fn log_trace(client_id: &str, data: &Value) {
    let field = |key: &str| data.get(key).cloned().unwrap_or(Value::Null);

    tracing::info!(
        target: "trace",
        client_id = %client_id,
        kind = %field("type"),
        session = %field("session"),
        prefix = %field("prefix"),
        peer = %field("peer"),
        time = %field("time"),
        value = %field("value"),
        "trace"
    );
}
