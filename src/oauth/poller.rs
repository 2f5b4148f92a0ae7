use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};

use super::{DeviceCode, DeviceFlowProvider, ProviderIdentity, TokenPoll};
use crate::auth::ProviderTokenCipher;
use crate::error::Error;
use crate::store::Store;
use crate::types::{User, UserStatus};

/// How a single device flow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user behind `user_id` is now accepted. On re-authentication this is
    /// the pre-existing account rather than the scratch user.
    Succeeded { user_id: String },
    /// The provider refused; the scratch user is kept as denied.
    Denied,
    /// The flow failed and the scratch user was deleted.
    Dropped,
    /// The device code ran out before the provider answered.
    Expired,
    /// The scratch user's keys reached the existing account, but refreshing
    /// that account failed.
    Failed,
}

/// Drives one device authorization to a terminal state, mutating only the
/// scratch user it was started for (and, on re-authentication, the account
/// that user collapses into).
#[derive(Clone)]
pub struct DevicePoller {
    store: Arc<dyn Store>,
    provider: Arc<dyn DeviceFlowProvider>,
    cipher: ProviderTokenCipher,
}

impl DevicePoller {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn DeviceFlowProvider>,
        cipher: ProviderTokenCipher,
    ) -> Self {
        Self {
            store,
            provider,
            cipher,
        }
    }

    /// Runs the flow on a detached task.
    pub fn spawn(&self, scratch: User, code: DeviceCode) -> JoinHandle<PollOutcome> {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(scratch, code).await })
    }

    pub async fn run(&self, scratch: User, code: DeviceCode) -> PollOutcome {
        let deadline = Instant::now() + Duration::from_secs(code.expires_in);
        let mut interval = code.interval.max(1);

        loop {
            if Instant::now() >= deadline {
                tracing::warn!(user_id = %scratch.id, "device code expired before sign-in completed");
                return PollOutcome::Expired;
            }

            let poll = match self.provider.poll_access_token(&code.device_code).await {
                Ok(poll) => poll,
                Err(e) => {
                    tracing::warn!(user_id = %scratch.id, "failed to poll for access token: {e}");
                    self.drop_user(&scratch);
                    return PollOutcome::Dropped;
                }
            };

            match poll {
                TokenPoll::Granted { access_token } => {
                    return self.complete(scratch, &access_token).await;
                }
                TokenPoll::AuthorizationPending => {}
                TokenPoll::SlowDown { interval: requested } => {
                    interval = next_interval(interval, requested);
                    tracing::debug!(user_id = %scratch.id, interval, "provider asked to slow down");
                }
                TokenPoll::AccessDenied | TokenPoll::ExpiredToken => {
                    return self.deny(scratch);
                }
                rejected @ (TokenPoll::IncorrectDeviceCode
                | TokenPoll::IncorrectClientCredentials
                | TokenPoll::UnsupportedGrantType) => {
                    tracing::error!(user_id = %scratch.id, "device flow rejected: {rejected:?}");
                    self.drop_user(&scratch);
                    return PollOutcome::Dropped;
                }
                TokenPoll::Unrecognized { code, description } => {
                    tracing::error!(
                        user_id = %scratch.id,
                        "unknown device flow error {code}: {}",
                        description.unwrap_or_default()
                    );
                    self.drop_user(&scratch);
                    return PollOutcome::Dropped;
                }
            }

            sleep(Duration::from_secs(interval)).await;
        }
    }

    async fn complete(&self, scratch: User, access_token: &str) -> PollOutcome {
        let identity = match self.provider.fetch_identity(access_token).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!(user_id = %scratch.id, "failed to fetch provider identity: {e}");
                self.drop_user(&scratch);
                return PollOutcome::Dropped;
            }
        };

        let encrypted = match self.cipher.encrypt(access_token) {
            Ok(encrypted) => encrypted,
            Err(e) => {
                tracing::error!(user_id = %scratch.id, "failed to encrypt access token: {e}");
                self.drop_user(&scratch);
                return PollOutcome::Dropped;
            }
        };

        let existing = match self.store.get_user_by_external_id(&identity.node_id) {
            Ok(existing) => existing,
            Err(e) => {
                tracing::error!(user_id = %scratch.id, "failed to look up existing account: {e}");
                self.drop_user(&scratch);
                return PollOutcome::Dropped;
            }
        };
        if let Some(existing) = existing.filter(|existing| existing.id != scratch.id) {
            return self.collapse(&scratch, existing, identity, encrypted);
        }

        let mut user = scratch.clone();
        user.username = Some(identity.login.clone());
        user.external_id = Some(identity.node_id.clone());
        user.encrypted_token = Some(encrypted.clone());

        let saved = user
            .transition(UserStatus::Accepted)
            .and_then(|()| self.store.update_user(&user));
        match saved {
            Ok(()) => {
                tracing::info!(user_id = %user.id, "sign-in completed");
                PollOutcome::Succeeded { user_id: user.id }
            }
            // A concurrent sign-in for the same identity got there first.
            Err(Error::AlreadyExists) => {
                match self.store.get_user_by_external_id(&identity.node_id) {
                    Ok(Some(existing)) if existing.id != scratch.id => {
                        self.collapse(&scratch, existing, identity, encrypted)
                    }
                    Ok(_) => {
                        tracing::error!(user_id = %scratch.id, "external id conflict without an owner");
                        self.drop_user(&scratch);
                        PollOutcome::Dropped
                    }
                    Err(e) => {
                        tracing::error!(user_id = %scratch.id, "failed to look up existing account: {e}");
                        self.drop_user(&scratch);
                        PollOutcome::Dropped
                    }
                }
            }
            Err(e) => {
                tracing::error!(user_id = %scratch.id, "failed to save accepted user: {e}");
                self.drop_user(&scratch);
                PollOutcome::Dropped
            }
        }
    }

    /// Folds the scratch user into the account already linked to this
    /// identity. The scratch user's keys move over and the scratch row goes.
    fn collapse(
        &self,
        scratch: &User,
        mut existing: User,
        identity: ProviderIdentity,
        encrypted: String,
    ) -> PollOutcome {
        if !existing.status.can_transition_to(UserStatus::Accepted) {
            tracing::warn!(user_id = %existing.id, status = %existing.status, "existing account cannot sign in");
            self.drop_user(scratch);
            return PollOutcome::Dropped;
        }

        match self.store.transfer_api_keys(&scratch.id, &existing.id) {
            Ok(moved) => tracing::info!(
                user_id = %existing.id,
                moved,
                "re-authentication, moved keys to existing account"
            ),
            Err(e) => {
                tracing::error!(user_id = %existing.id, "failed to move keys to existing account: {e}");
                self.drop_user(scratch);
                return PollOutcome::Dropped;
            }
        }
        self.drop_user(scratch);

        existing.username = Some(identity.login);
        existing.encrypted_token = Some(encrypted);
        let saved = existing
            .transition(UserStatus::Accepted)
            .and_then(|()| self.store.update_user(&existing));
        if let Err(e) = saved {
            tracing::error!(user_id = %existing.id, "failed to refresh existing account: {e}");
            return PollOutcome::Failed;
        }

        tracing::info!(user_id = %existing.id, "sign-in completed");
        PollOutcome::Succeeded {
            user_id: existing.id,
        }
    }

    fn deny(&self, mut scratch: User) -> PollOutcome {
        let saved = scratch
            .transition(UserStatus::Denied)
            .and_then(|()| self.store.update_user(&scratch));

        if let Err(e) = saved {
            tracing::error!(user_id = %scratch.id, "failed to mark user denied: {e}");
            self.drop_user(&scratch);
            return PollOutcome::Dropped;
        }

        tracing::warn!(user_id = %scratch.id, "sign-in denied by provider");
        PollOutcome::Denied
    }

    fn drop_user(&self, user: &User) {
        match self.store.delete_user(&user.id) {
            Ok(_) => tracing::debug!(user_id = %user.id, "dropped scratch user"),
            Err(e) => tracing::error!(user_id = %user.id, "failed to drop scratch user: {e}"),
        }
    }
}

/// The interval after a `slow_down`: the provider's value when it sends one,
/// otherwise double. Never shorter than the current interval.
fn next_interval(current: u64, requested: Option<u64>) -> u64 {
    match requested {
        Some(requested) => requested.max(current),
        None => current.saturating_mul(2),
    }
}
