pub mod engine;
pub mod registry;
pub mod relay;
pub mod room;
pub mod signaling;
pub mod waiting;

pub use engine::{RelayServer, ServerStats};
pub use registry::{Capability, ClientId, ConnectionRegistry, EventSender, Resources};
pub use relay::Relay;
pub use room::{Member, Role, RoomDescription, RoomDirectory};
pub use signaling::{ClientEvent, ServerEvent, SignalingHandler};
pub use waiting::{JoinCallback, JoinOutcome, WaitingQueue};
