use serde::Serialize;
use tokio::task::JoinHandle;

use super::Identity;
use crate::error::Result;
use crate::oauth::PollOutcome;
use crate::types::{Role, User};

/// What the caller of a sign-in gets back immediately.
#[derive(Debug, Clone, Serialize)]
pub struct SignIn {
    pub message: String,
    /// Admin bearer for the new account. Usable once the sign-in completes.
    pub api_key: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
}

impl Identity {
    /// Starts a device flow sign-in.
    ///
    /// Requests a device code, creates a pending scratch user holding a
    /// global admin key, then leaves the provider polling to a detached task.
    /// The returned handle resolves when that task settles; dropping it does
    /// not cancel the task.
    pub async fn sign_in(&self) -> Result<(SignIn, JoinHandle<PollOutcome>)> {
        let code = self.provider.request_device_code().await.inspect_err(|e| {
            tracing::error!("could not request a device code: {e}");
        })?;

        let user = User::new_pending();
        self.store.create_user(&user)?;

        let api_key = match self.issue_scratch_key(&user) {
            Ok(bearer) => bearer,
            Err(e) => {
                tracing::error!(user_id = %user.id, "could not set up scratch user: {e}");
                if let Err(cleanup) = self.store.delete_user(&user.id) {
                    tracing::error!(user_id = %user.id, "failed to drop scratch user: {cleanup}");
                }
                return Err(e);
            }
        };

        let response = SignIn {
            message: format!(
                "Sign-in process started. Open {} in your browser and enter the code {} when \
                 prompted. Use the API key from this response for all future requests. Save \
                 it somewhere safe, it will not be shown again and admin keys cannot be \
                 recreated.",
                code.verification_uri, code.user_code
            ),
            api_key,
            user_code: code.user_code.clone(),
            verification_uri: code.verification_uri.clone(),
            expires_in: code.expires_in,
        };

        tracing::info!(user_id = %user.id, "sign-in started");
        let handle = self.poller.spawn(user, code);

        Ok((response, handle))
    }

    fn issue_scratch_key(&self, user: &User) -> Result<String> {
        let issued = self.generate_key_for(&user.id)?;
        self.permissions
            .add(&issued.key.id, None, Role::Admin.as_str(), &user.id)?;
        Ok(issued.bearer)
    }
}
