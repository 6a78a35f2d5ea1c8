use thiserror::Error;

/// Custom error types for the signaling relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Room membership errors
    #[error("Room {0} is full")]
    RoomFull(String),

    #[error("Room {0} is already taken")]
    RoomTaken(String),

    #[error("Client {client_id} is already a member of room {room}")]
    AlreadyInRoom { client_id: String, room: String },

    /// Waiting queue errors
    #[error("Client {0} already has a pending join request")]
    AlreadyPending(String),

    #[error("No pending request for client {0}")]
    NotFound(String),

    #[error("Client {0} is not a provider")]
    NotProvider(String),

    /// Connection errors
    #[error("Client {0} is not connected")]
    NotConnected(String),

    /// Signaling errors
    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Convenience type alias for Results using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Helper to create configuration errors
    pub fn config(msg: impl Into<String>) -> Self {
        RelayError::InvalidConfiguration(msg.into())
    }

    /// Short machine-readable code sent back to clients in replies
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::RoomFull(_) => "full",
            RelayError::RoomTaken(_) => "taken",
            RelayError::AlreadyInRoom { .. } => "alreadyInRoom",
            RelayError::AlreadyPending(_) => "alreadyPending",
            RelayError::NotFound(_) => "notFound",
            RelayError::NotProvider(_) => "notProvider",
            RelayError::NotConnected(_) => "notConnected",
            RelayError::BadRequest(_) => "badRequest",
            RelayError::SerializationFailed(_) => "serialization",
            RelayError::InvalidConfiguration(_) => "configuration",
        }
    }
}
