mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // API key operations
    /// Inserts the key, or on conflict by `(hashed_value, user_id)` only
    /// refreshes `last_used_at`.
    fn save_api_key(&self, key: &ApiKey) -> Result<()>;
    fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>>;
    fn get_api_key_for_user(&self, id: &str, user_id: &str) -> Result<Option<ApiKey>>;
    fn list_user_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>>;
    fn delete_api_key(&self, id: &str) -> Result<bool>;
    /// Moves every key owned by `from_user_id` to `to_user_id`.
    fn transfer_api_keys(&self, from_user_id: &str, to_user_id: &str) -> Result<usize>;

    // Permission operations
    fn create_permission(&self, permission: &Permission) -> Result<()>;
    fn get_permission(&self, id: &str) -> Result<Option<Permission>>;
    /// Exact match on `database_id`, where `None` only matches the global grant.
    fn find_permission(&self, key_id: &str, database_id: Option<&str>)
    -> Result<Option<Permission>>;
    fn list_key_permissions(&self, key_id: &str) -> Result<Vec<Permission>>;
    fn delete_permission(&self, id: &str) -> Result<bool>;

    // Database ownership
    fn create_database(&self, database: &Database) -> Result<()>;
    fn get_database_for_user(&self, id: &str, user_id: &str) -> Result<Option<Database>>;
}
