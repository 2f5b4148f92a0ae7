//! Role grants on API keys and the evaluator that answers "may this key do
//! that on this database".
//!
//! A grant is scoped to one database, or global when it has no database.
//! When a database is named, a scoped grant for it decides on its own; the
//! key's global grant is only consulted when no scoped grant exists.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Permission, Role};

#[derive(Clone)]
pub struct Permissions {
    store: Arc<dyn Store>,
}

impl Permissions {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Grants `role` to `key_id`, on `database_id` or globally.
    ///
    /// A named database must exist and belong to `requester_user_id`.
    pub fn add(
        &self,
        key_id: &str,
        database_id: Option<&str>,
        role: &str,
        requester_user_id: &str,
    ) -> Result<Permission> {
        let role: Role = role.parse()?;

        if let Some(database_id) = database_id {
            if self
                .store
                .get_database_for_user(database_id, requester_user_id)?
                .is_none()
            {
                tracing::debug!(database_id, "grant refused, database not owned by requester");
                return Err(Error::NotFound);
            }
        }

        let permission = Permission::new(key_id, database_id, role);
        self.store.create_permission(&permission).inspect_err(|e| {
            tracing::warn!(key_id, ?database_id, %role, "could not save permission: {e}");
        })?;

        tracing::info!(key_id, ?database_id, %role, "permission granted");
        Ok(permission)
    }

    pub fn remove(&self, id: &str) -> Result<Permission> {
        let permission = self.store.get_permission(id)?.ok_or(Error::NotFound)?;
        if !self.store.delete_permission(&permission.id)? {
            return Err(Error::NotFound);
        }
        Ok(permission)
    }

    pub fn get(&self, id: &str) -> Result<Option<Permission>> {
        self.store.get_permission(id)
    }

    pub fn list_for_key(&self, key_id: &str) -> Result<Vec<Permission>> {
        self.store.list_key_permissions(key_id)
    }

    /// Returns whether `key_id` may perform `operation` on `database_id`, or on
    /// every database when `database_id` is `None`.
    pub fn can(&self, key_id: &str, database_id: Option<&str>, operation: &str) -> Result<bool> {
        let operation = Role::parse(operation).ok_or_else(|| {
            Error::InvalidArgument(
                "Selected operation is not valid, must be one of `admin`, `write`, or `read`"
                    .into(),
            )
        })?;
        self.allows(key_id, database_id, operation)
    }

    /// [`Permissions::can`] with an already parsed operation.
    pub fn allows(&self, key_id: &str, database_id: Option<&str>, operation: Role) -> Result<bool> {
        let mut grant = self.store.find_permission(key_id, database_id)?;
        if grant.is_none() && database_id.is_some() {
            grant = self.store.find_permission(key_id, None)?;
        }

        Ok(grant.is_some_and(|g| g.role.allows(operation)))
    }

    pub fn can_admin(&self, key_id: &str) -> Result<bool> {
        self.allows(key_id, None, Role::Admin)
    }

    pub fn can_admin_database(&self, key_id: &str, database_id: &str) -> Result<bool> {
        self.allows(key_id, Some(database_id), Role::Admin)
    }

    pub fn can_write_database(&self, key_id: &str, database_id: &str) -> Result<bool> {
        self.allows(key_id, Some(database_id), Role::Write)
    }

    pub fn can_read_database(&self, key_id: &str, database_id: &str) -> Result<bool> {
        self.allows(key_id, Some(database_id), Role::Read)
    }

    /// Like [`Permissions::allows`], but a refusal is an error.
    pub fn require(&self, key_id: &str, database_id: Option<&str>, operation: Role) -> Result<()> {
        if self.allows(key_id, database_id, operation)? {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "API key doesn't have the ability to {operation} the database"
            )))
        }
    }
}
