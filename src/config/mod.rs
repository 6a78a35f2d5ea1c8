use std::env;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{RelayError, Result};
use crate::turn::{StunServer, TurnServer, MAX_EXPIRY_SECS};

const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub rooms: RoomsConfig,
    pub ice: IceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct RoomsConfig {
    /// Maximum members per room, `None` when unlimited
    pub max_clients: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct IceConfig {
    pub stun_servers: Vec<StunServer>,
    pub turn_servers: Vec<TurnServer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("SERVER_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| RelayError::config(format!("Invalid SERVER_PORT: {}", raw)))?,
            None => 8080,
        };

        let max_clients = match lookup("ROOMS_MAX_CLIENTS") {
            Some(raw) => {
                let max: usize = raw.parse().map_err(|_| {
                    RelayError::config(format!("Invalid ROOMS_MAX_CLIENTS: {}", raw))
                })?;
                // 0 disables the limit
                (max > 0).then_some(max)
            }
            None => None,
        };

        let stun_servers = lookup("STUN_SERVERS")
            .unwrap_or_else(|| DEFAULT_STUN_SERVER.to_string())
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| StunServer { url: url.to_string() })
            .collect();

        let turn_servers = match lookup("TURN_SERVERS") {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Vec<TurnServer>>(&raw)
                .map_err(|e| RelayError::config(format!("Invalid TURN_SERVERS: {}", e)))?,
            _ => Vec::new(),
        };

        if let Some(server) = turn_servers
            .iter()
            .find(|t| t.expiry.is_some_and(|e| e > MAX_EXPIRY_SECS))
        {
            return Err(RelayError::config(format!(
                "Invalid TURN_SERVERS: expiry for {} exceeds {} seconds",
                server.url, MAX_EXPIRY_SECS
            )));
        }

        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(RelayError::config(format!("Invalid LOG_FORMAT: {}", other)));
            }
        };

        Ok(Self {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            rooms: RoomsConfig { max_clients },
            ice: IceConfig {
                stun_servers,
                turn_servers,
            },
            logging: LoggingConfig { format },
        })
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::UNSPECIFIED;
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::LOCALHOST,
            "" | "0.0.0.0" => Ipv4Addr::UNSPECIFIED,
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::UNSPECIFIED
            }
        }
    }
}
