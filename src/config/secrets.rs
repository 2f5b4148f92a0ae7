use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

pub const OAUTH_CLIENT_ID_VAR: &str = "OAUTH_CLIENT_ID";
pub const TOKEN_AEAD_KEY_VAR: &str = "TOKEN_AEAD_KEY";
pub const PROVIDER_TOKEN_AEAD_KEY_VAR: &str = "PROVIDER_TOKEN_AEAD_KEY";

const BASE64_PREFIX: &str = "base64:";

/// Process-wide secrets. Read once at startup and never mutated.
#[derive(Clone)]
pub struct Secrets {
    /// Public client id registered with the device-flow provider.
    pub oauth_client_id: String,
    /// 32-byte key sealing bearer tokens.
    pub token_key: [u8; 32],
    /// 16, 24 or 32-byte AES key sealing provider access tokens at rest.
    pub provider_token_key: Vec<u8>,
}

impl Secrets {
    /// Loads secrets from `OAUTH_CLIENT_ID`, `TOKEN_AEAD_KEY` and
    /// `PROVIDER_TOKEN_AEAD_KEY`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| Error::Config(format!("{name} is not set")))
        };

        Self::from_values(
            &var(OAUTH_CLIENT_ID_VAR)?,
            &var(TOKEN_AEAD_KEY_VAR)?,
            &var(PROVIDER_TOKEN_AEAD_KEY_VAR)?,
        )
    }

    /// Keys are either raw strings (their UTF-8 bytes are the key) or
    /// `base64:`-prefixed standard base64.
    pub fn from_values(client_id: &str, token_key: &str, provider_token_key: &str) -> Result<Self> {
        if client_id.trim().is_empty() {
            return Err(Error::Config(format!("{OAUTH_CLIENT_ID_VAR} cannot be empty")));
        }

        let token_key: [u8; 32] = decode_key(token_key)?.try_into().map_err(|k: Vec<u8>| {
            Error::Config(format!(
                "{TOKEN_AEAD_KEY_VAR} must be 32 bytes, got {}",
                k.len()
            ))
        })?;

        let provider_token_key = decode_key(provider_token_key)?;
        if !matches!(provider_token_key.len(), 16 | 24 | 32) {
            return Err(Error::Config(format!(
                "{PROVIDER_TOKEN_AEAD_KEY_VAR} must be 16, 24 or 32 bytes, got {}",
                provider_token_key.len()
            )));
        }

        Ok(Self {
            oauth_client_id: client_id.to_string(),
            token_key,
            provider_token_key,
        })
    }
}

fn decode_key(value: &str) -> Result<Vec<u8>> {
    match value.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Config(format!("invalid base64 key: {e}"))),
        None => Ok(value.as_bytes().to_vec()),
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("oauth_client_id", &self.oauth_client_id)
            .field("token_key", &"<redacted>")
            .field("provider_token_key", &"<redacted>")
            .finish()
    }
}
