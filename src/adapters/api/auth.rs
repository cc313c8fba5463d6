//! CLOB API authentication - HMAC request signing.
//!
//! Authenticated REST requests carry `POLY_*` headers with an
//! HMAC-SHA256 signature over `timestamp + method + path + body`,
//! base64-encoded. The WebSocket user channel does not use this; it
//! sends the credentials object verbatim in its subscribe frame.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

/// API credentials for the CLOB.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    /// API key issued by the venue.
    pub api_key: String,
    /// API secret for HMAC signing.
    pub api_secret: String,
    /// Passphrase for the additional auth layer.
    pub api_passphrase: String,
}

impl ApiCredentials {
    /// Whether all three credential parts are present.
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.api_passphrase.is_empty()
    }
}

/// Signs CLOB REST requests with the configured credentials.
pub struct ClobAuth {
    credentials: ApiCredentials,
}

impl ClobAuth {
    /// Create an auth manager from credentials.
    ///
    /// # Errors
    /// Fails when any credential part is missing; callers should not
    /// construct a signer for unauthenticated use.
    pub fn new(credentials: ApiCredentials) -> Result<Self> {
        anyhow::ensure!(
            credentials.is_complete(),
            "CLOB auth requires api_key, api_secret and api_passphrase"
        );
        Ok(Self { credentials })
    }

    /// The stored credentials.
    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    /// Generate the HMAC-SHA256 signature for a request.
    pub fn sign_request(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);
        let mac = hmac_sha256::HMAC::mac(
            message.as_bytes(),
            self.credentials.api_secret.as_bytes(),
        );
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, mac)
    }

    /// Current Unix timestamp in seconds, as the header string.
    pub fn timestamp() -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock before Unix epoch")?;
        Ok(now.as_secs().to_string())
    }
}
