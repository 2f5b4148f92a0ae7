use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TOKEN_PREFIX: &str = "headb.v1.";
const NONCE_LEN: usize = 24;

/// What a bearer carries once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerClaims {
    pub key_id: String,
    pub key_value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct WireClaims {
    kid: String,
    kv: String,
    exp: i64,
}

/// Seals `(key_value, key_id, expiry)` into an opaque URL-safe bearer with
/// XChaCha20-Poly1305. Every token gets a fresh random nonce and the version
/// prefix is bound as associated data.
#[derive(Clone)]
pub struct TokenCodec {
    cipher: XChaCha20Poly1305,
}

impl TokenCodec {
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    pub fn encrypt(&self, key_value: &str, key_id: &str, expires_at: DateTime<Utc>) -> Result<String> {
        let claims = WireClaims {
            kid: key_id.to_string(),
            kv: key_value.to_string(),
            exp: expires_at.timestamp(),
        };
        let plaintext = serde_json::to_vec(&claims)
            .map_err(|e| Error::Crypto(format!("failed to encode claims: {e}")))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: TOKEN_PREFIX.as_bytes(),
                },
            )
            .map_err(|_| Error::Crypto("failed to seal bearer".into()))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + sealed.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);

        Ok(format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(raw)))
    }

    /// Opens a bearer. Tampering, malformed input and expiry all collapse
    /// into [`Error::InvalidToken`].
    pub fn decrypt(&self, bearer: &str) -> Result<BearerClaims> {
        self.decrypt_at(bearer, Utc::now())
    }

    pub fn decrypt_at(&self, bearer: &str, now: DateTime<Utc>) -> Result<BearerClaims> {
        let encoded = bearer
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(Error::InvalidToken)?;
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| Error::InvalidToken)?;

        if raw.len() <= NONCE_LEN {
            return Err(Error::InvalidToken);
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: TOKEN_PREFIX.as_bytes(),
                },
            )
            .map_err(|_| Error::InvalidToken)?;

        let claims: WireClaims =
            serde_json::from_slice(&plaintext).map_err(|_| Error::InvalidToken)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(Error::InvalidToken)?;

        if expires_at <= now {
            return Err(Error::InvalidToken);
        }

        Ok(BearerClaims {
            key_id: claims.kid,
            key_value: claims.kv,
            expires_at,
        })
    }
}
