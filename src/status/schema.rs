// src/status/schema.rs

//! Status database schema and migrations
//!
//! Each destination keeps one status database. The schema evolves through
//! numbered migrations recorded in `schema_version`.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current status schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying status schema migration {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!(
            "Unknown status schema version: {}",
            version
        ))),
    }
}

/// Version 1: installed packages and their file lists
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            version TEXT NOT NULL,
            architecture TEXT,
            description TEXT,
            tags TEXT,
            section TEXT,
            relations TEXT NOT NULL DEFAULT '{}',
            filename TEXT,
            size INTEGER,
            sha256 TEXT,
            state_status TEXT NOT NULL CHECK(state_status IN (
                'not-installed', 'unpacked', 'half-configured', 'installed',
                'half-installed', 'config-files', 'post-inst-failed', 'removal-failed'
            )),
            state_flag INTEGER NOT NULL DEFAULT 0,
            essential INTEGER NOT NULL DEFAULT 0,
            source TEXT,
            installed_time INTEGER
        );

        CREATE INDEX idx_packages_state ON packages(state_status);

        CREATE TABLE package_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            UNIQUE(package_id, path),
            FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_package_files_path ON package_files(path);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        migrate(&conn).unwrap();

        let tables = tables(&conn);
        assert!(tables.contains(&"packages".to_string()));
        assert!(tables.contains(&"package_files".to_string()));
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_essential_defaults_to_false() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO packages (name, version, state_status) VALUES ('foo', '1.0', 'installed')",
            [],
        )
        .unwrap();

        let essential: bool = conn
            .query_row("SELECT essential FROM packages WHERE name = 'foo'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(!essential);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            apply_migration(&conn, SCHEMA_VERSION + 1),
            Err(Error::InitError(_))
        ));
    }

    #[test]
    fn test_state_status_is_checked() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO packages (name, version, state_status) VALUES ('foo', '1.0', 'bogus')",
            [],
        );
        assert!(result.is_err());
    }
}
