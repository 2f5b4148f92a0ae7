pub const SCHEMA: &str = r#"
-- Users are created pending by sign-in and promoted by the device flow
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT,
    token TEXT,                   -- provider access token, AES-GCM encrypted
    external_id TEXT UNIQUE,      -- provider identity id, NULL until accepted
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'accepted', 'denied')),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- API keys only ever store the argon2id hash of the verifier
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    hashed_value TEXT NOT NULL,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    last_used_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(hashed_value, user_id)
);

-- Databases owned by users; only ownership is tracked here
CREATE TABLE IF NOT EXISTS databases (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(user_id, name)
);

-- Role grants for a key, on one database or globally (database_id NULL)
CREATE TABLE IF NOT EXISTS permissions (
    id TEXT PRIMARY KEY,
    key_id TEXT NOT NULL REFERENCES api_keys(id) ON DELETE CASCADE,
    database_id TEXT REFERENCES databases(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('admin', 'write', 'read')),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- One grant per (key, database); the global grant is its own slot
CREATE UNIQUE INDEX IF NOT EXISTS idx_permissions_key_database
    ON permissions(key_id, database_id) WHERE database_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_permissions_key_global
    ON permissions(key_id) WHERE database_id IS NULL;

CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id);
CREATE INDEX IF NOT EXISTS idx_databases_user ON databases(user_id);
"#;
