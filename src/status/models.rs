// src/status/models.rs

//! Rows of the status database

use crate::error::{Error, Result};
use crate::package::{Package, Relations, StateFlag, StateStatus};
use rusqlite::{Connection, OptionalExtension, Row, params};

const RECORD_COLUMNS: &str = "id, name, version, architecture, description, tags, section, \
     relations, filename, size, sha256, state_status, state_flag, source, installed_time, essential";

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

/// Status of one package on a destination
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub id: Option<i64>,
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub section: Option<String>,
    pub relations: Relations,
    pub filename: Option<String>,
    pub size: Option<i64>,
    pub sha256: Option<String>,
    pub state_status: StateStatus,
    pub state_flag: StateFlag,
    pub source: Option<String>,
    pub installed_time: Option<i64>,
    pub essential: bool,
}

impl StatusRecord {
    pub fn from_package(pkg: &Package) -> Self {
        Self {
            id: None,
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            architecture: pkg.architecture.clone(),
            description: pkg.description.clone(),
            tags: pkg.tags.clone(),
            section: pkg.section.clone(),
            relations: pkg.relations.clone(),
            filename: pkg.filename.clone(),
            size: pkg.size.map(|s| s as i64),
            sha256: pkg.sha256.clone(),
            state_status: pkg.state_status,
            state_flag: pkg.state_flag - StateFlag::FILELIST_CHANGED,
            source: pkg.src.clone(),
            installed_time: pkg.installed_time,
            essential: pkg.essential,
        }
    }

    /// Package record on `dest`, without its file list
    pub fn into_package(self, dest: &str) -> Package {
        Package {
            name: self.name,
            version: self.version,
            architecture: self.architecture,
            description: self.description,
            tags: self.tags,
            section: self.section,
            relations: self.relations,
            filename: self.filename,
            size: self.size.map(|s| s as u64),
            sha256: self.sha256,
            essential: self.essential,
            state_status: self.state_status,
            state_flag: self.state_flag,
            src: self.source,
            installed_time: self.installed_time,
            dest: Some(dest.to_string()),
            ..Default::default()
        }
    }

    /// Insert or replace the row for this name, returning its id
    pub fn upsert(&mut self, conn: &Connection) -> Result<i64> {
        let relations = serde_json::to_string(&self.relations)
            .map_err(|e| Error::ParseError(format!("Cannot encode relations: {}", e)))?;

        conn.execute(
            "INSERT INTO packages (name, version, architecture, description, tags, section,
                 relations, filename, size, sha256, state_status, state_flag, source,
                 installed_time, essential)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(name) DO UPDATE SET
                 version = excluded.version,
                 architecture = excluded.architecture,
                 description = excluded.description,
                 tags = excluded.tags,
                 section = excluded.section,
                 relations = excluded.relations,
                 filename = excluded.filename,
                 size = excluded.size,
                 sha256 = excluded.sha256,
                 state_status = excluded.state_status,
                 state_flag = excluded.state_flag,
                 source = excluded.source,
                 installed_time = excluded.installed_time,
                 essential = excluded.essential",
            params![
                &self.name,
                &self.version,
                &self.architecture,
                &self.description,
                &self.tags,
                &self.section,
                relations,
                &self.filename,
                &self.size,
                &self.sha256,
                self.state_status.as_str(),
                i64::from(self.state_flag.bits()),
                &self.source,
                &self.installed_time,
                self.essential,
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM packages WHERE name = ?1",
            [&self.name],
            |row| row.get(0),
        )?;
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE name = ?1",
            RECORD_COLUMNS
        ))?;
        let record = stmt.query_row([name], Self::from_row).optional()?;
        Ok(record)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY name",
            RECORD_COLUMNS
        ))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn list_names(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT name FROM packages ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Delete a row and, through the foreign key, its file list
    pub fn delete_by_name(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE name = ?1", [name])?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let relations: String = row.get(7)?;
        let relations =
            serde_json::from_str(&relations).map_err(|e| conversion_error(7, e))?;

        let status: String = row.get(11)?;
        let state_status = status.parse::<StateStatus>().map_err(|e| {
            conversion_error(
                11,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        let flag: i64 = row.get(12)?;

        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            version: row.get(2)?,
            architecture: row.get(3)?,
            description: row.get(4)?,
            tags: row.get(5)?,
            section: row.get(6)?,
            relations,
            filename: row.get(8)?,
            size: row.get(9)?,
            sha256: row.get(10)?,
            state_status,
            state_flag: StateFlag::from_bits_truncate(flag as u32),
            source: row.get(13)?,
            installed_time: row.get(14)?,
            essential: row.get(15)?,
        })
    }
}

/// One installed file of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListEntry {
    pub id: Option<i64>,
    pub package_id: i64,
    pub path: String,
}

impl FileListEntry {
    /// Replace the whole file list of a package
    pub fn replace_for_package(conn: &Connection, package_id: i64, paths: &[String]) -> Result<()> {
        conn.execute("DELETE FROM package_files WHERE package_id = ?1", [package_id])?;

        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO package_files (package_id, path) VALUES (?1, ?2)",
        )?;
        for path in paths {
            stmt.execute(params![package_id, path])?;
        }
        Ok(())
    }

    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, package_id, path FROM package_files WHERE package_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map([package_id], |row| {
                Ok(Self {
                    id: Some(row.get(0)?),
                    package_id: row.get(1)?,
                    path: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Relation;
    use crate::status::schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    fn sample_package() -> Package {
        let mut pkg = Package::new("busybox", "1.36.1-r3");
        pkg.architecture = Some("armv7".to_string());
        pkg.relations.depends = Relation::parse_list("libc (>= 1.2)");
        pkg.state_status = StateStatus::Installed;
        pkg.state_flag = StateFlag::USER | StateFlag::FILELIST_CHANGED;
        pkg.essential = true;
        pkg.size = Some(4096);
        pkg.src = Some("base".to_string());
        pkg.dest = Some("root".to_string());
        pkg
    }

    #[test]
    fn test_record_round_trip() {
        let conn = test_conn();
        let mut record = StatusRecord::from_package(&sample_package());
        let id = record.upsert(&conn).unwrap();

        let found = StatusRecord::find_by_name(&conn, "busybox").unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.relations.depends[0].constraint.as_deref(), Some(">= 1.2"));
        // The rewrite marker is never stored
        assert_eq!(found.state_flag, StateFlag::USER);

        let pkg = found.into_package("root");
        assert_eq!(pkg.dest.as_deref(), Some("root"));
        assert_eq!(pkg.size, Some(4096));
        assert!(pkg.essential);
        assert!(pkg.is_installed());
    }

    #[test]
    fn test_upsert_keeps_row_id() {
        let conn = test_conn();
        let mut pkg = sample_package();
        let first = StatusRecord::from_package(&pkg).upsert(&conn).unwrap();

        pkg.version = "1.37.0".to_string();
        let second = StatusRecord::from_package(&pkg).upsert(&conn).unwrap();

        assert_eq!(first, second);
        let all = StatusRecord::list_all(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version, "1.37.0");
    }

    #[test]
    fn test_file_list_cascade() {
        let conn = test_conn();
        let id = StatusRecord::from_package(&sample_package())
            .upsert(&conn)
            .unwrap();

        let files = vec!["/bin/busybox".to_string(), "/bin/sh".to_string()];
        FileListEntry::replace_for_package(&conn, id, &files).unwrap();
        FileListEntry::replace_for_package(&conn, id, &files[..1]).unwrap();
        let entries = FileListEntry::find_by_package(&conn, id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/bin/busybox");

        StatusRecord::delete_by_name(&conn, "busybox").unwrap();
        assert!(FileListEntry::find_by_package(&conn, id).unwrap().is_empty());
        assert!(StatusRecord::list_names(&conn).unwrap().is_empty());
    }
}
