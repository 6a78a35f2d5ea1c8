//! ICE server descriptions and time-limited TURN credentials.
//!
//! Credentials follow the TURN REST scheme: the username is the expiry
//! timestamp and the password is `base64(HMAC-SHA1(secret, username))`, so a
//! TURN server holding the same secret can validate them without talking to
//! the relay.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

/// Lifetime of an issued credential when the server does not configure one
pub const DEFAULT_EXPIRY_SECS: u64 = 86_400;

/// Longest credential lifetime a TURN server may be configured with
pub const MAX_EXPIRY_SECS: u64 = 365 * 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StunServer {
    pub url: String,
}

/// A TURN server sharing `secret` with this relay
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnServer {
    pub url: String,
    pub secret: String,
    #[serde(default)]
    pub expiry: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCredential {
    pub username: String,
    pub credential: String,
    pub url: String,
}

impl TurnServer {
    /// Issue a credential valid until `now_secs + expiry`
    pub fn credential_at(&self, now_secs: u64) -> TurnCredential {
        let username = now_secs
            .saturating_add(self.expiry.unwrap_or(DEFAULT_EXPIRY_SECS))
            .to_string();

        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(username.as_bytes());
        let credential = STANDARD.encode(mac.finalize().into_bytes());

        TurnCredential {
            username,
            credential,
            url: self.url.clone(),
        }
    }
}

/// Fresh credentials for every configured TURN server
pub fn issue_credentials(servers: &[TurnServer]) -> Vec<TurnCredential> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    servers.iter().map(|server| server.credential_at(now)).collect()
}
