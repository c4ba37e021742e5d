// src/status/mod.rs

//! Status persistence
//!
//! Every destination keeps an SQLite status database under its status
//! directory. Writing replaces a destination's whole status inside one
//! transaction; loading turns rows back into installed package records.

pub mod models;
pub mod schema;

pub use models::{FileListEntry, StatusRecord};

use crate::config::Config;
use crate::database::PackageDatabase;
use crate::error::{Error, Result};
use crate::package::{PackageId, StateFlag, StateStatus};
use crate::registry::Destination;
use rusqlite::{Connection, Transaction};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Create (or upgrade) a status database
///
/// Safe to call on an existing database.
pub fn init(db_path: &Path) -> Result<()> {
    debug!("Initializing status database at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::InitError(format!(
                "Failed to create status directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    schema::migrate(&conn)?;
    Ok(())
}

/// Open an existing status database
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound(db_path.display().to_string()));
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(conn)
}

/// Run `f` inside a transaction, committing only on success
pub fn transaction<F, T>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Record that represents `name` on a destination, if any is still live
fn live_record(db: &PackageDatabase, ids: &[PackageId]) -> Option<PackageId> {
    ids.iter()
        .copied()
        .find(|id| db.get(*id).state_status.is_installed_family())
        .or_else(|| {
            ids.iter()
                .copied()
                .find(|id| db.get(*id).state_status != StateStatus::NotInstalled)
        })
}

/// Persist the status of every destination
pub fn write_status_files(config: &Config, db: &mut PackageDatabase) -> Result<()> {
    if config.flags.noaction {
        info!("noaction set, status not written");
        return Ok(());
    }

    for dest in config.registry.destinations() {
        let mut by_name: BTreeMap<String, Vec<PackageId>> = BTreeMap::new();
        for id in db.ids() {
            let pkg = db.get(id);
            if pkg.dest.as_deref() == Some(dest.name.as_str()) {
                by_name.entry(pkg.name.clone()).or_default().push(id);
            }
        }

        let path = dest.status_db_path();
        if by_name.is_empty() && !path.exists() {
            continue;
        }

        let live: Vec<PackageId> = by_name
            .values()
            .filter_map(|ids| live_record(db, ids))
            .collect();
        let live_names: HashSet<String> = live.iter().map(|id| db.get(*id).name.clone()).collect();

        init(&path)?;
        let mut conn = open(&path)?;
        transaction(&mut conn, |tx| {
            for name in StatusRecord::list_names(tx)? {
                if !live_names.contains(&name) {
                    debug!("Dropping {} from status of {}", name, dest.name);
                    StatusRecord::delete_by_name(tx, &name)?;
                }
            }

            for id in &live {
                let pkg = db.get(*id);
                let row_id = StatusRecord::from_package(pkg).upsert(tx)?;
                if pkg.state_flag.contains(StateFlag::FILELIST_CHANGED) {
                    FileListEntry::replace_for_package(tx, row_id, &pkg.files)?;
                }
            }
            Ok(())
        })?;

        for id in live {
            db.get_mut(id).state_flag.remove(StateFlag::FILELIST_CHANGED);
        }
        debug!("Wrote status of destination {}", dest.name);
    }

    Ok(())
}

/// Load a destination's status into the package database
///
/// Returns the number of records loaded. A destination without a status
/// database has nothing installed.
pub fn load_status(dest: &Destination, db: &mut PackageDatabase) -> Result<usize> {
    let path = dest.status_db_path();
    if !path.exists() {
        return Ok(0);
    }

    init(&path)?;
    let conn = open(&path)?;

    let records = StatusRecord::list_all(&conn)?;
    let count = records.len();
    for record in records {
        let row_id = record.id;
        let mut pkg = record.into_package(&dest.name);
        if let Some(row_id) = row_id {
            pkg.files = FileListEntry::find_by_package(&conn, row_id)?
                .into_iter()
                .map(|entry| entry.path)
                .collect();
        }
        db.insert(pkg)?;
    }

    debug!("Loaded {} status records for {}", count, dest.name);
    Ok(count)
}
