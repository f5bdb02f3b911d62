//! Database schema definitions.

use crate::error::Result;
use rusqlite::Connection;
use tracing::info;

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current = get_schema_version(conn)?;
    if current == 0 {
        info!(version = SCHEMA_VERSION, "creating database schema");
        conn.execute_batch(PROJECTS_SCHEMA)?;
        conn.execute_batch(POSTS_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current > SCHEMA_VERSION {
        return Err(crate::error::Error::store(format!(
            "database schema v{current} is newer than this build (v{SCHEMA_VERSION})"
        )));
    }
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

const PROJECTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT    NOT NULL,
    slug        TEXT    NOT NULL UNIQUE,
    category    TEXT    NOT NULL DEFAULT '',
    status      TEXT    NOT NULL DEFAULT 'upcoming'
                CHECK (status IN ('ongoing', 'completed', 'upcoming')),
    year        INTEGER,
    location    TEXT,
    description TEXT    NOT NULL,
    image_path  TEXT,
    sort_order  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_order ON projects (sort_order, created_at);
"#;

const POSTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    title        TEXT    NOT NULL,
    slug         TEXT    NOT NULL UNIQUE,
    excerpt      TEXT,
    body         TEXT    NOT NULL,
    author       TEXT    NOT NULL,
    category     TEXT    NOT NULL DEFAULT '',
    tags         TEXT,
    status       TEXT    NOT NULL DEFAULT 'draft'
                 CHECK (status IN ('draft', 'published')),
    image_path   TEXT,
    views        INTEGER NOT NULL DEFAULT 0,
    published_at TEXT,
    created_at   TEXT    NOT NULL,
    updated_at   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_public ON posts (status, published_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        assert!(init_schema(&conn).is_err());
    }
}
