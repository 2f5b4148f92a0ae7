//! Users, API keys and bearer resolution.

mod signin;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

pub use signin::SignIn;

use crate::auth::{
    Caller, HashParams, KeyHasher, ProviderTokenCipher, TokenCodec, authenticate,
    generate_verifier,
};
use crate::config::Secrets;
use crate::error::{Error, Result};
use crate::oauth::{DeviceFlowProvider, DevicePoller};
use crate::permissions::Permissions;
use crate::store::Store;
use crate::types::{ApiKey, Role, User};

/// A freshly minted key. `bearer` is shown to the caller once and never stored.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub bearer: String,
    pub key: ApiKey,
}

/// Public view of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub id: String,
    pub last_used_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<ApiKey> for KeySummary {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

pub struct Identity {
    store: Arc<dyn Store>,
    permissions: Permissions,
    codec: TokenCodec,
    hasher: KeyHasher,
    cipher: ProviderTokenCipher,
    provider: Arc<dyn DeviceFlowProvider>,
    poller: DevicePoller,
    key_lifetime: Duration,
}

impl Identity {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn DeviceFlowProvider>,
        secrets: &Secrets,
        hashing: HashParams,
        key_lifetime: Duration,
    ) -> Result<Self> {
        if key_lifetime <= Duration::zero() || Utc::now().checked_add_signed(key_lifetime).is_none() {
            return Err(Error::Config(format!(
                "key lifetime of {} days cannot be used",
                key_lifetime.num_days()
            )));
        }

        let cipher = ProviderTokenCipher::new(&secrets.provider_token_key)?;
        let poller = DevicePoller::new(store.clone(), provider.clone(), cipher.clone());

        Ok(Self {
            permissions: Permissions::new(store.clone()),
            codec: TokenCodec::new(&secrets.token_key),
            hasher: KeyHasher::new(hashing)?,
            cipher,
            provider,
            poller,
            key_lifetime,
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Mints a key for `user_id` and returns its bearer. Only the hash of the
    /// verifier is persisted.
    pub fn generate_key_for(&self, user_id: &str) -> Result<IssuedKey> {
        let expires_at = Utc::now()
            .checked_add_signed(self.key_lifetime)
            .ok_or_else(|| Error::Config("key lifetime overflows the expiry timestamp".into()))?;

        let verifier = generate_verifier();
        let key = ApiKey::new(self.hasher.hash(&verifier)?, user_id);
        self.store.save_api_key(&key)?;

        let bearer = self.codec.encrypt(&verifier, &key.id, expires_at)?;

        tracing::info!(user_id, key_id = %key.id, "issued api key");
        Ok(IssuedKey { bearer, key })
    }

    /// Removes a key; bearers that reference it stop authenticating.
    pub fn delete_key(&self, id: &str) -> Result<()> {
        if !self.store.delete_api_key(id)? {
            return Err(Error::NotFound);
        }
        tracing::info!(key_id = id, "deleted api key");
        Ok(())
    }

    pub fn authenticate(&self, bearer: &str) -> Result<Caller> {
        authenticate(self.store.as_ref(), &self.codec, &self.hasher, bearer)
    }

    /// Recovers the provider access token stored on `user`.
    pub fn decrypt_provider_token(&self, user: &User) -> Result<String> {
        let sealed = user.encrypted_token.as_deref().ok_or(Error::NotFound)?;
        self.cipher.decrypt(sealed)
    }

    /// Key management needs a key holding a global admin grant.
    pub fn require_admin(&self, caller: &Caller) -> Result<()> {
        if self.permissions.can_admin(&caller.key_id)? {
            Ok(())
        } else {
            Err(Error::PermissionDenied(
                "API key cannot be used for admin operations".into(),
            ))
        }
    }

    /// Mints a `write` or `read` key for the caller's user. Admin keys only
    /// come from sign-in.
    pub fn generate_api_key(
        &self,
        caller: &Caller,
        role: &str,
        database_id: Option<&str>,
    ) -> Result<IssuedKey> {
        self.require_admin(caller)?;

        let role: Role = role.parse()?;
        if role == Role::Admin {
            return Err(Error::InvalidArgument(
                "Selected role is not valid, must be one of `write` or `read`".into(),
            ));
        }

        let issued = self.generate_key_for(&caller.user_id)?;

        if let Err(e) =
            self.permissions
                .add(&issued.key.id, database_id, role.as_str(), &caller.user_id)
        {
            if let Err(cleanup) = self.store.delete_api_key(&issued.key.id) {
                tracing::error!(key_id = %issued.key.id, "failed to delete ungranted key: {cleanup}");
            }
            return Err(e);
        }

        Ok(issued)
    }

    pub fn list_api_keys(&self, caller: &Caller) -> Result<Vec<KeySummary>> {
        self.require_admin(caller)?;
        let keys = self.store.list_user_api_keys(&caller.user_id)?;
        Ok(keys.into_iter().map(KeySummary::from).collect())
    }

    /// Deletes one of the caller's own keys.
    pub fn delete_api_key(&self, caller: &Caller, id: &str) -> Result<()> {
        self.require_admin(caller)?;
        let key = self
            .store
            .get_api_key_for_user(id, &caller.user_id)?
            .ok_or(Error::NotFound)?;
        self.delete_key(&key.id)
    }
}
