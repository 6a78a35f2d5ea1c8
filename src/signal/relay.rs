use serde_json::{Map, Value};
use std::sync::Arc;

use super::registry::ConnectionRegistry;
use super::signaling::ServerEvent;

/// Point-to-point forwarding of opaque signaling payloads. Room membership is
/// not consulted: any connected client may be addressed by identity.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forward `payload` to `to`, stamping it with the sender's identity.
    /// Messages for unknown recipients are dropped; returns whether the
    /// message was queued for delivery.
    pub async fn forward(&self, from: &str, to: &str, mut payload: Map<String, Value>) -> bool {
        payload.insert("from".to_string(), Value::String(from.to_string()));

        match self.registry.send(to, ServerEvent::Message(payload)).await {
            Ok(()) => {
                tracing::trace!(from = %from, to = %to, "Relayed message");
                true
            }
            Err(e) => {
                tracing::debug!(from = %from, to = %to, error = %e, "Dropping relayed message");
                false
            }
        }
    }
}
