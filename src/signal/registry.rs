use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::signaling::ServerEvent;
use crate::error::{RelayError, Result};

pub type ClientId = String;

/// Outbound half of a client's connection. Events pushed here are written to
/// the socket in the order they were sent.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Media a client currently publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub screen: bool,
    pub video: bool,
    pub audio: bool,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            screen: false,
            video: true,
            audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Screen,
    Video,
    Audio,
}

impl Resources {
    pub fn set(&mut self, capability: Capability, value: bool) {
        match capability {
            Capability::Screen => self.screen = value,
            Capability::Video => self.video = value,
            Capability::Audio => self.audio = value,
        }
    }
}

struct ClientEntry {
    sender: EventSender,
    resources: Resources,
}

/// Every connected client, addressable by the identity assigned at connect
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, sender: EventSender) -> ClientId {
        let client_id = Uuid::new_v4().to_string();

        let mut clients = self.clients.write().await;
        clients.insert(
            client_id.clone(),
            ClientEntry {
                sender,
                resources: Resources::default(),
            },
        );

        tracing::debug!(client_id = %client_id, total = clients.len(), "Client registered");
        client_id
    }

    pub async fn unregister(&self, client_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(client_id).is_some();
        if removed {
            tracing::debug!(client_id = %client_id, total = clients.len(), "Client unregistered");
        }
        removed
    }

    /// Queue an event for a client. Fails with `NotConnected` when the identity
    /// is unknown or its socket writer has already gone away.
    pub async fn send(&self, client_id: &str, event: ServerEvent) -> Result<()> {
        let clients = self.clients.read().await;
        let entry = clients
            .get(client_id)
            .ok_or_else(|| RelayError::NotConnected(client_id.to_string()))?;

        entry
            .sender
            .send(event)
            .map_err(|_| RelayError::NotConnected(client_id.to_string()))
    }

    pub async fn set_capability(
        &self,
        client_id: &str,
        capability: Capability,
        value: bool,
    ) -> Result<()> {
        let mut clients = self.clients.write().await;
        let entry = clients
            .get_mut(client_id)
            .ok_or_else(|| RelayError::NotConnected(client_id.to_string()))?;

        entry.resources.set(capability, value);
        tracing::debug!(
            client_id = %client_id,
            capability = ?capability,
            value,
            "Capability changed"
        );
        Ok(())
    }

    pub async fn resources_of(&self, client_id: &str) -> Option<Resources> {
        let clients = self.clients.read().await;
        clients.get(client_id).map(|entry| entry.resources)
    }

    pub async fn is_connected(&self, client_id: &str) -> bool {
        let clients = self.clients.read().await;
        clients.contains_key(client_id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_assigns_unique_ids() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let a = registry.register(tx.clone()).await;
        let b = registry.register(tx).await;

        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
        assert!(registry.is_connected(&a).await);
    }

    #[tokio::test]
    async fn test_default_resources() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        let resources = registry.resources_of(&id).await.unwrap();
        assert!(!resources.screen);
        assert!(resources.video);
        assert!(!resources.audio);
    }

    #[tokio::test]
    async fn test_send_preserves_order() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        for n in 0..3 {
            registry
                .send(&id, ServerEvent::Offer { id: format!("patient-{}", n) })
                .await
                .unwrap();
        }

        for n in 0..3 {
            assert_eq!(
                rx.recv().await.unwrap(),
                ServerEvent::Offer { id: format!("patient-{}", n) }
            );
        }
    }

    #[tokio::test]
    async fn test_send_to_unknown_client() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .send("ghost", ServerEvent::Offer { id: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;
        drop(rx);

        let err = registry
            .send(&id, ServerEvent::Offer { id: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_set_capability() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        registry.set_capability(&id, Capability::Screen, true).await.unwrap();
        assert!(registry.resources_of(&id).await.unwrap().screen);

        registry.set_capability(&id, Capability::Screen, false).await.unwrap();
        assert!(!registry.resources_of(&id).await.unwrap().screen);

        assert!(registry.set_capability("ghost", Capability::Audio, true).await.is_err());
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx).await;

        assert!(registry.unregister(&id).await);
        assert!(!registry.unregister(&id).await);
        assert!(!registry.is_connected(&id).await);
        assert_eq!(registry.len().await, 0);
    }
}
