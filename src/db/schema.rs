//! Database schema and migrations for Hangar.
//!
//! Migrations are applied in order when the database is opened. Each entry
//! runs in its own transaction and is recorded in `schema_version`.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: users, with the quota invariant enforced by the table itself
    r#"
CREATE TABLE users (
    id              TEXT PRIMARY KEY,
    username        TEXT NOT NULL UNIQUE COLLATE NOCASE,
    email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password        TEXT NOT NULL,           -- Argon2 PHC string
    role            TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
    storage_quota   INTEGER NOT NULL,
    used_storage    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    CHECK (used_storage >= 0 AND used_storage <= storage_quota)
);
"#,
    // v2: storage providers, one default per (user, type)
    r#"
CREATE TABLE storage_providers (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    config      TEXT NOT NULL,           -- JSON object
    is_default  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX idx_storage_providers_user ON storage_providers(user_id);
CREATE UNIQUE INDEX idx_storage_providers_default
    ON storage_providers(user_id, type) WHERE is_default = 1;
"#,
    // v3: file catalog
    r#"
CREATE TABLE files (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    stored_name     TEXT NOT NULL UNIQUE,
    original_name   TEXT NOT NULL,
    file_size       INTEGER NOT NULL CHECK (file_size >= 0),
    mime_type       TEXT NOT NULL,
    storage_type    TEXT NOT NULL DEFAULT 'local',
    storage_id      TEXT REFERENCES storage_providers(id),
    download_count  INTEGER NOT NULL DEFAULT 0,
    is_public       INTEGER NOT NULL DEFAULT 0,
    expires_at      TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX idx_files_user_created ON files(user_id, created_at);
CREATE INDEX idx_files_storage ON files(storage_id);
"#,
    // v4: download log
    r#"
CREATE TABLE download_logs (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id         TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    user_id         TEXT REFERENCES users(id) ON DELETE SET NULL,
    ip_address      TEXT,
    user_agent      TEXT,
    downloaded_at   TEXT NOT NULL
);

CREATE INDEX idx_download_logs_file ON download_logs(file_id, downloaded_at);
"#,
    // v5: key/value settings
    r#"
CREATE TABLE system_config (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#,
    // v6: rows whose bytes are being removed; hidden from readers
    r#"
ALTER TABLE files ADD COLUMN deleting INTEGER NOT NULL DEFAULT 0;
"#,
];
