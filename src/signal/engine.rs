use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::registry::{Capability, ClientId, ConnectionRegistry, EventSender};
use super::relay::Relay;
use super::room::{Member, Role, RoomDescription, RoomDirectory};
use super::signaling::ServerEvent;
use super::waiting::{JoinCallback, JoinOutcome, WaitingQueue};
use crate::config::{IceConfig, RoomsConfig};
use crate::error::{RelayError, Result};
use crate::turn;

/// Room and waiting-queue state. Every transition below runs with this locked,
/// so no operation observes a client half-way between membership and pending.
struct MatchState {
    rooms: RoomDirectory,
    waiting: WaitingQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    /// A new join replaces whatever the client had
    Rejoin,
    Leave,
    Disconnect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub clients: usize,
    pub rooms: usize,
    pub pending: usize,
}

/// Matchmaking engine: admits providers, offers patients to them and relays
/// signaling between admitted clients.
pub struct RelayServer {
    registry: Arc<ConnectionRegistry>,
    relay: Relay,
    state: Mutex<MatchState>,
    capacity: Option<usize>,
    ice: IceConfig,
}

impl RelayServer {
    pub fn new(rooms: RoomsConfig, ice: IceConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());

        Self {
            relay: Relay::new(registry.clone()),
            registry,
            state: Mutex::new(MatchState {
                rooms: RoomDirectory::new(rooms.max_clients),
                waiting: WaitingQueue::new(),
            }),
            capacity: rooms.max_clients,
            ice,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn ice(&self) -> &IceConfig {
        &self.ice
    }

    /// Register a new connection and send it its identity and ICE servers
    pub async fn connect(&self, sender: EventSender) -> ClientId {
        let client_id = self.registry.register(sender).await;

        self.notify(&client_id, ServerEvent::Connected { id: client_id.clone() }).await;
        self.notify(&client_id, ServerEvent::Stunservers(self.ice.stun_servers.clone())).await;
        self.notify(
            &client_id,
            ServerEvent::Turnservers(turn::issue_credentials(&self.ice.turn_servers)),
        )
        .await;

        tracing::info!(client_id = %client_id, "Client connected");
        client_id
    }

    /// Handle a join request. `callback` receives the outcome exactly once,
    /// possibly much later for patients waiting on a provider. Requests with an
    /// empty room name are ignored and the callback is dropped.
    pub async fn join(&self, client_id: &str, room: &str, role: Role, callback: JoinCallback) {
        if room.trim().is_empty() {
            tracing::debug!(client_id = %client_id, "Ignoring join without a room name");
            return;
        }

        let mut state = self.state.lock().await;

        if state.rooms.is_full(room) {
            tracing::info!(client_id = %client_id, room = %room, "Join refused, room full");
            callback(JoinOutcome::Full);
            return;
        }

        self.vacate(&mut state, client_id, Departure::Rejoin).await;

        tracing::info!(client_id = %client_id, room = %room, role = ?role, "Client tries to enter");

        match role {
            Role::Patient => self.request_admission(&mut state, client_id, room, callback).await,
            Role::Provider | Role::Unassigned => {
                self.host(&mut state, client_id, room, Some(callback)).await
            }
        }
    }

    /// Create a room hosted by `client_id`. A missing name is replaced with a
    /// generated one; a name with members already in it is `RoomTaken`.
    pub async fn create(&self, client_id: &str, name: Option<String>) -> Result<String> {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = self.state.lock().await;

        if state.rooms.contains(&name) {
            tracing::info!(client_id = %client_id, room = %name, "Room name taken");
            return Err(RelayError::RoomTaken(name));
        }

        self.vacate(&mut state, client_id, Departure::Rejoin).await;
        self.host(&mut state, client_id, &name, None).await;

        Ok(name)
    }

    /// A provider accepts a waiting patient. The patient is admitted into the
    /// room it asked for, whichever room the provider is in.
    pub async fn accept(&self, provider_id: &str, patient_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.rooms.role_of(provider_id) != Role::Provider {
            return Err(RelayError::NotProvider(provider_id.to_string()));
        }

        self.admit(&mut state, patient_id).await?;
        tracing::info!(provider_id = %provider_id, patient_id = %patient_id, "Patient accepted");
        Ok(())
    }

    pub async fn leave(&self, client_id: &str) {
        let mut state = self.state.lock().await;
        self.vacate(&mut state, client_id, Departure::Leave).await;
    }

    /// Leave everything and forget the connection
    pub async fn disconnect(&self, client_id: &str) {
        let mut state = self.state.lock().await;
        self.vacate(&mut state, client_id, Departure::Disconnect).await;
        self.registry.unregister(client_id).await;

        tracing::info!(client_id = %client_id, "Client disconnected");
    }

    pub async fn share_screen(&self, client_id: &str) {
        if let Err(e) = self
            .registry
            .set_capability(client_id, Capability::Screen, true)
            .await
        {
            tracing::debug!(client_id = %client_id, error = %e, "Screen share ignored");
        }
    }

    /// Stop screen sharing and tell the rest of the room to drop the feed
    pub async fn unshare_screen(&self, client_id: &str) {
        if let Err(e) = self
            .registry
            .set_capability(client_id, Capability::Screen, false)
            .await
        {
            tracing::debug!(client_id = %client_id, error = %e, "Screen unshare ignored");
            return;
        }

        let state = self.state.lock().await;
        let Some(room) = state.rooms.room_of(client_id) else {
            return;
        };

        for member in state.rooms.members_of(room) {
            if member.id == client_id {
                continue;
            }
            self.notify(
                &member.id,
                ServerEvent::Removed {
                    id: client_id.to_string(),
                    kind: Some("screen".to_string()),
                },
            )
            .await;
        }
    }

    pub async fn members_of(&self, room: &str) -> Vec<Member> {
        self.state.lock().await.rooms.members_of(room)
    }

    pub async fn role_of(&self, client_id: &str) -> Role {
        self.state.lock().await.rooms.role_of(client_id)
    }

    pub async fn room_of(&self, client_id: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .rooms
            .room_of(client_id)
            .map(str::to_owned)
    }

    pub async fn is_pending(&self, client_id: &str) -> bool {
        self.state.lock().await.waiting.is_pending(client_id)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub async fn stats(&self) -> ServerStats {
        let (rooms, pending) = {
            let state = self.state.lock().await;
            (state.rooms.room_count(), state.waiting.len())
        };

        ServerStats {
            clients: self.registry.len().await,
            rooms,
            pending,
        }
    }

    /// Add a provider and admit everyone already waiting for the room
    async fn host(
        &self,
        state: &mut MatchState,
        client_id: &str,
        room: &str,
        callback: Option<JoinCallback>,
    ) {
        if let Err(e) = state.rooms.add(room, client_id, Role::Provider) {
            tracing::warn!(client_id = %client_id, room = %room, error = %e, "Provider not admitted");
            if let (Some(callback), RelayError::RoomFull(_)) = (callback, &e) {
                callback(JoinOutcome::Full);
            }
            return;
        }

        tracing::info!(client_id = %client_id, room = %room, "Provider joined room");

        for patient_id in state.waiting.waiting_for(room) {
            if let Err(e) = self.admit(state, &patient_id).await {
                tracing::info!(patient_id = %patient_id, room = %room, error = %e, "Waiting patient not admitted");
            }
        }

        if let Some(callback) = callback {
            let description = self.describe(&state.rooms, room, client_id).await;
            callback(JoinOutcome::Admitted { description });
        }
    }

    /// Offer a patient to every provider in the room, or refuse it when there
    /// is nobody to offer it to
    async fn request_admission(
        &self,
        state: &mut MatchState,
        client_id: &str,
        room: &str,
        callback: JoinCallback,
    ) {
        let providers = state.rooms.providers_in(room);

        if providers.is_empty() {
            tracing::info!(client_id = %client_id, room = %room, "No provider in room, join refused");
            callback(JoinOutcome::NoProvider);
            return;
        }

        if let Err(e) = state.waiting.enqueue(client_id, room, callback) {
            tracing::error!(client_id = %client_id, error = %e, "Failed to queue join request");
            return;
        }

        tracing::info!(
            client_id = %client_id,
            room = %room,
            providers = providers.len(),
            waiting = state.waiting.len(),
            "Patient waiting for acceptance"
        );

        for provider_id in providers {
            self.notify(&provider_id, ServerEvent::Offer { id: client_id.to_string() })
                .await;
        }
    }

    /// Move a waiting patient into the room it asked for
    async fn admit(&self, state: &mut MatchState, patient_id: &str) -> Result<()> {
        let request = state
            .waiting
            .take(patient_id)
            .ok_or_else(|| RelayError::NotFound(patient_id.to_string()))?;
        let room = request.room().to_string();

        let description = self.describe(&state.rooms, &room, patient_id).await;

        if let Err(e) = state.rooms.add(&room, patient_id, Role::Patient) {
            request.complete(JoinOutcome::Full);
            return Err(e);
        }

        tracing::info!(patient_id = %patient_id, room = %room, "Patient admitted");
        request.complete(JoinOutcome::Admitted { description });
        Ok(())
    }

    /// Drop any pending request and membership the client holds
    async fn vacate(&self, state: &mut MatchState, client_id: &str, departure: Departure) {
        let had_request = match departure {
            Departure::Rejoin => state.waiting.resolve(client_id, JoinOutcome::Superseded),
            Departure::Leave | Departure::Disconnect => state.waiting.cancel(client_id),
        };
        if had_request {
            tracing::info!(client_id = %client_id, departure = ?departure, "Pending request dropped");
        }

        let Some(room) = state.rooms.room_of(client_id).map(str::to_owned) else {
            return;
        };

        state.rooms.remove(&room, client_id);
        tracing::info!(client_id = %client_id, room = %room, departure = ?departure, "Client left room");

        for member in state.rooms.members_of(&room) {
            self.notify(
                &member.id,
                ServerEvent::Removed {
                    id: client_id.to_string(),
                    kind: None,
                },
            )
            .await;
        }
    }

    /// Members of `room` other than `exclude`, with their current media
    async fn describe(&self, rooms: &RoomDirectory, room: &str, exclude: &str) -> RoomDescription {
        let mut clients = BTreeMap::new();
        for member in rooms.members_of(room) {
            if member.id == exclude {
                continue;
            }
            if let Some(resources) = self.registry.resources_of(&member.id).await {
                clients.insert(member.id, resources);
            }
        }
        RoomDescription { clients }
    }

    async fn notify(&self, client_id: &str, event: ServerEvent) {
        if let Err(e) = self.registry.send(client_id, event).await {
            tracing::debug!(client_id = %client_id, error = %e, "Notification dropped");
        }
    }
}
