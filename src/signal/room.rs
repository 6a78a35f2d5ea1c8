use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::registry::{ClientId, Resources};
use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Patient,
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: ClientId,
    pub role: Role,
}

/// Snapshot of a room handed to a client when it is admitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDescription {
    pub clients: BTreeMap<ClientId, Resources>,
}

#[derive(Debug, Default)]
struct Room {
    /// Join order
    members: Vec<Member>,
}

/// Rooms keyed by name. A room exists only while it has members: the first
/// `add` creates it and the `remove` that empties it drops it.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
    memberships: HashMap<ClientId, String>,
    capacity: Option<usize>,
}

impl RoomDirectory {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn members_of(&self, room: &str) -> Vec<Member> {
        self.rooms
            .get(room)
            .map(|r| r.members.clone())
            .unwrap_or_default()
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |r| r.members.len())
    }

    pub fn is_full(&self, room: &str) -> bool {
        self.capacity
            .is_some_and(|max| self.member_count(room) >= max)
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn add(&mut self, room: &str, client_id: &str, role: Role) -> Result<()> {
        if role == Role::Unassigned {
            return Err(RelayError::BadRequest(format!(
                "client {} cannot join {} without a role",
                client_id, room
            )));
        }

        if let Some(current) = self.memberships.get(client_id) {
            return Err(RelayError::AlreadyInRoom {
                client_id: client_id.to_string(),
                room: current.clone(),
            });
        }

        if self.is_full(room) {
            return Err(RelayError::RoomFull(room.to_string()));
        }

        self.rooms
            .entry(room.to_string())
            .or_default()
            .members
            .push(Member {
                id: client_id.to_string(),
                role,
            });
        self.memberships
            .insert(client_id.to_string(), room.to_string());

        Ok(())
    }

    /// Returns false when the client was not a member of `room`
    pub fn remove(&mut self, room: &str, client_id: &str) -> bool {
        let Some(entry) = self.rooms.get_mut(room) else {
            return false;
        };

        let before = entry.members.len();
        entry.members.retain(|m| m.id != client_id);
        if entry.members.len() == before {
            return false;
        }

        self.memberships.remove(client_id);
        if entry.members.is_empty() {
            self.rooms.remove(room);
            tracing::debug!(room = %room, "Room emptied and dropped");
        }

        true
    }

    pub fn room_of(&self, client_id: &str) -> Option<&str> {
        self.memberships.get(client_id).map(String::as_str)
    }

    pub fn role_of(&self, client_id: &str) -> Role {
        self.room_of(client_id)
            .and_then(|room| self.rooms.get(room))
            .and_then(|r| r.members.iter().find(|m| m.id == client_id))
            .map_or(Role::Unassigned, |m| m.role)
    }

    pub fn providers_in(&self, room: &str) -> Vec<ClientId> {
        self.rooms
            .get(room)
            .map(|r| {
                r.members
                    .iter()
                    .filter(|m| m.role == Role::Provider)
                    .map(|m| m.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
