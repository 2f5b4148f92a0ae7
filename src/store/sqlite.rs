use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database. Used by tests and tooling.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Maps constraint failures on insert/update to domain errors.
fn constraint_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                Error::AlreadyExists
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::NotFound,
            _ => Error::from(err),
        },
        _ => Error::from(err),
    }
}

impl ToSql for UserStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        UserStatus::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown user status '{s}'").into()))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown role '{s}'").into()))
    }
}

const USER_COLUMNS: &str = "id, username, token, external_id, status, created_at, updated_at";
const API_KEY_COLUMNS: &str = "id, hashed_value, user_id, last_used_at, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, key_id, database_id, role, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        encrypted_token: row.get(2)?,
        external_id: row.get(3)?,
        status: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn api_key_from_row(row: &Row<'_>) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        hashed_value: row.get(1)?,
        user_id: row.get(2)?,
        last_used_at: row.get::<_, Option<String>>(3)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn permission_from_row(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: row.get(0)?,
        key_id: row.get(1)?,
        database_id: row.get(2)?,
        role: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, token, external_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id,
                    user.username,
                    user.encrypted_token,
                    user.external_id,
                    user.status,
                    format_datetime(&user.created_at),
                    format_datetime(&user.updated_at),
                ],
            )
            .map_err(constraint_error)?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
            params![external_id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE users SET username = ?1, token = ?2, external_id = ?3, status = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    user.username,
                    user.encrypted_token,
                    user.external_id,
                    user.status,
                    format_datetime(&Utc::now()),
                    user.id,
                ],
            )
            .map_err(constraint_error)?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // API key operations

    fn save_api_key(&self, key: &ApiKey) -> Result<()> {
        let now = format_datetime(&Utc::now());
        self.conn()
            .execute(
                "INSERT INTO api_keys (id, hashed_value, user_id, last_used_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(hashed_value, user_id) DO UPDATE SET last_used_at = ?7
                 ON CONFLICT(id) DO UPDATE SET last_used_at = ?7",
                params![
                    key.id,
                    key.hashed_value,
                    key.user_id,
                    key.last_used_at.as_ref().map(format_datetime),
                    format_datetime(&key.created_at),
                    format_datetime(&key.updated_at),
                    now,
                ],
            )
            .map_err(constraint_error)?;
        Ok(())
    }

    fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = ?1"),
            params![id],
            api_key_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_api_key_for_user(&self, id: &str, user_id: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = ?1 AND user_id = ?2"),
            params![id, user_id],
            api_key_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE user_id = ?1 ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params![user_id], api_key_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_api_key(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM api_keys WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn transfer_api_keys(&self, from_user_id: &str, to_user_id: &str) -> Result<usize> {
        let rows = self
            .conn()
            .execute(
                "UPDATE api_keys SET user_id = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![to_user_id, format_datetime(&Utc::now()), from_user_id],
            )
            .map_err(constraint_error)?;
        Ok(rows)
    }

    // Permission operations

    fn create_permission(&self, permission: &Permission) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO permissions (id, key_id, database_id, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    permission.id,
                    permission.key_id,
                    permission.database_id,
                    permission.role,
                    format_datetime(&permission.created_at),
                    format_datetime(&permission.updated_at),
                ],
            )
            .map_err(constraint_error)?;
        Ok(())
    }

    fn get_permission(&self, id: &str) -> Result<Option<Permission>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = ?1"),
            params![id],
            permission_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_permission(
        &self,
        key_id: &str,
        database_id: Option<&str>,
    ) -> Result<Option<Permission>> {
        let conn = self.conn();
        // `IS` compares NULL to NULL as equal, so `None` selects the global grant.
        conn.query_row(
            &format!(
                "SELECT {PERMISSION_COLUMNS} FROM permissions
                 WHERE key_id = ?1 AND database_id IS ?2 LIMIT 1"
            ),
            params![key_id, database_id],
            permission_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_key_permissions(&self, key_id: &str) -> Result<Vec<Permission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE key_id = ?1 ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map(params![key_id], permission_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_permission(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM permissions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Database ownership

    fn create_database(&self, database: &Database) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO databases (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    database.id,
                    database.user_id,
                    database.name,
                    format_datetime(&database.created_at),
                ],
            )
            .map_err(constraint_error)?;
        Ok(())
    }

    fn get_database_for_user(&self, id: &str, user_id: &str) -> Result<Option<Database>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, user_id, name, created_at FROM databases WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            |row| {
                Ok(Database {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }
}
