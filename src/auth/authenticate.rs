use chrono::Utc;
use serde::Serialize;

use super::{KeyHasher, TokenCodec};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::UserStatus;

/// The identity resolved from a bearer, handed to every authenticated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub user_id: String,
    pub key_id: String,
    pub username: Option<String>,
}

/// Extracts the token from an `Authorization` header value.
/// Only the Bearer scheme is accepted.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves a raw bearer to its caller.
///
/// Every negative outcome is [`Error::Unauthenticated`]; the failing step is
/// only logged. Storage failures pass through unchanged so they surface as
/// internal errors.
pub fn authenticate(
    store: &dyn Store,
    codec: &TokenCodec,
    hasher: &KeyHasher,
    bearer: &str,
) -> Result<Caller> {
    if bearer.is_empty() {
        return Err(Error::Unauthenticated);
    }

    let claims = codec.decrypt(bearer).map_err(|_| {
        tracing::debug!("rejected bearer: failed to open token");
        Error::Unauthenticated
    })?;

    let Some(mut key) = store.get_api_key(&claims.key_id)? else {
        hasher.verify_decoy(&claims.key_value);
        tracing::debug!(key_id = %claims.key_id, "rejected bearer: unknown key");
        return Err(Error::Unauthenticated);
    };

    let matches = hasher.verify(&claims.key_value, &key.hashed_value).map_err(|e| {
        tracing::warn!(key_id = %key.id, "stored key hash is unusable: {e}");
        Error::Unauthenticated
    })?;
    if !matches {
        tracing::warn!(key_id = %key.id, "rejected bearer: verifier mismatch");
        return Err(Error::Unauthenticated);
    }

    let Some(user) = store.get_user(&key.user_id)? else {
        tracing::debug!(key_id = %key.id, "rejected bearer: owner no longer exists");
        return Err(Error::Unauthenticated);
    };

    match user.status {
        UserStatus::Accepted => {}
        UserStatus::Pending => {
            tracing::debug!(user_id = %user.id, "user must finish sign-in before using this key");
            return Err(Error::Unauthenticated);
        }
        UserStatus::Denied => {
            tracing::debug!(user_id = %user.id, "sign-in was denied, user must sign in again");
            return Err(Error::Unauthenticated);
        }
    }

    key.last_used_at = Some(Utc::now());
    if let Err(e) = store.save_api_key(&key) {
        tracing::warn!(key_id = %key.id, "failed to update key last_used_at: {e}");
    }

    Ok(Caller {
        user_id: user.id,
        key_id: key.id,
        username: user.username,
    })
}
