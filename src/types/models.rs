use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;
use crate::error::{Error, Result};

/// Lifecycle of a user created by the device sign-in flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Waiting for the provider to confirm the sign-in.
    Pending,
    /// The provider confirmed the identity; only these users authenticate.
    Accepted,
    /// The provider or the user refused the sign-in.
    Denied,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Accepted => "accepted",
            UserStatus::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Option<UserStatus> {
        match s {
            "pending" => Some(UserStatus::Pending),
            "accepted" => Some(UserStatus::Accepted),
            "denied" => Some(UserStatus::Denied),
            _ => None,
        }
    }

    /// Accepted and Denied are terminal; re-entering the current state is a no-op.
    #[must_use]
    pub const fn can_transition_to(self, next: UserStatus) -> bool {
        matches!(
            (self, next),
            (UserStatus::Pending, _)
                | (UserStatus::Accepted, UserStatus::Accepted)
                | (UserStatus::Denied, UserStatus::Denied)
        )
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Provider access token, encrypted with the provider token cipher.
    #[serde(skip)]
    pub encrypted_token: Option<String>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A scratch user: pending, with every identity field empty.
    #[must_use]
    pub fn new_pending() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: None,
            username: None,
            encrypted_token: None,
            status: UserStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: UserStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidArgument(format!(
                "user cannot move from {} to {}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    #[serde(skip)]
    pub hashed_value: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Builds a key record from an already hashed verifier. Never pass a raw
    /// verifier here.
    #[must_use]
    pub fn new(hashed_value: String, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            hashed_value,
            user_id: user_id.to_string(),
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A role granted to an API key, on one database or (when `database_id` is
/// `None`) on every database owned by the key's user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    #[must_use]
    pub fn new(key_id: &str, database_id: Option<&str>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            key_id: key_id.to_string(),
            database_id: database_id.map(str::to_string),
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The slice of a content database the identity core needs: who owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
