pub mod api;
pub mod config;
pub mod error;
pub mod signal;
pub mod turn;

pub use config::Config;
pub use error::{RelayError, Result};
pub use signal::RelayServer;
