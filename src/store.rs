// src/store.rs

//! Installed-pallet store
//!
//! SQLite table of installed pallets, keyed by the natural key
//! (name, version, rel, arch, os). Inserts are idempotent on that key:
//! re-adding an already-present pallet is a no-op, never a duplicate row
//! and never an error.

use crate::error::Result;
use crate::pallet::PalletInfo;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// One persisted pallet row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletRecord {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub os: String,
    pub url: String,
}

/// Database of installed pallets
pub struct PalletStore {
    conn: Connection,
}

impl PalletStore {
    /// Open (creating and migrating as needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// An in-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        let current: i32 = self
            .conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for version in (current + 1)..=SCHEMA_VERSION {
            debug!("applying pallet store migration to version {}", version);
            self.apply_migration(version)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
        }
        Ok(())
    }

    fn apply_migration(&self, version: i32) -> Result<()> {
        match version {
            1 => {
                self.conn.execute(
                    "CREATE TABLE pallets (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        name TEXT NOT NULL,
                        version TEXT NOT NULL,
                        rel TEXT NOT NULL,
                        arch TEXT NOT NULL,
                        os TEXT NOT NULL,
                        url TEXT NOT NULL DEFAULT '',
                        added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                        UNIQUE(name, version, rel, arch, os)
                    )",
                    [],
                )?;
                Ok(())
            }
            _ => unreachable!("unknown pallet store migration version: {version}"),
        }
    }

    /// Insert a pallet row unless the natural key is already present.
    ///
    /// Returns whether a row was actually inserted.
    pub fn insert_if_absent(&self, pallet: &PalletInfo, url: &str) -> Result<bool> {
        if self.contains(pallet)? {
            debug!("{} already registered", pallet);
            return Ok(false);
        }

        self.conn.execute(
            "INSERT INTO pallets (name, version, rel, arch, os, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pallet.name(),
                pallet.version(),
                pallet.release(),
                pallet.arch(),
                pallet.distro_family(),
                url
            ],
        )?;
        info!("registered {}", pallet);
        Ok(true)
    }

    /// Whether a row with this pallet's natural key exists.
    pub fn contains(&self, pallet: &PalletInfo) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(id) FROM pallets
             WHERE name = ?1 AND version = ?2 AND rel = ?3 AND arch = ?4 AND os = ?5",
            params![
                pallet.name(),
                pallet.version(),
                pallet.release(),
                pallet.arch(),
                pallet.distro_family()
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Remove the row for this pallet, if any. Compensation for a failed
    /// ingestion that had already registered.
    pub fn remove(&self, pallet: &PalletInfo) -> Result<()> {
        self.conn.execute(
            "DELETE FROM pallets
             WHERE name = ?1 AND version = ?2 AND rel = ?3 AND arch = ?4 AND os = ?5",
            params![
                pallet.name(),
                pallet.version(),
                pallet.release(),
                pallet.arch(),
                pallet.distro_family()
            ],
        )?;
        Ok(())
    }

    /// All pallet rows, ordered by name then version.
    pub fn list(&self) -> Result<Vec<PalletRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, version, rel, arch, os, url FROM pallets
             ORDER BY name, version, rel",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PalletRecord {
                name: row.get(0)?,
                version: row.get(1)?,
                release: row.get(2)?,
                arch: row.get(3)?,
                os: row.get(4)?,
                url: row.get(5)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, version: &str) -> PalletInfo {
        PalletInfo::new(name, version, "1", "x86_64", "redhat").unwrap()
    }

    #[test]
    fn insert_is_idempotent_on_the_natural_key() {
        let store = PalletStore::in_memory().unwrap();
        let kernel = info("kernel", "7.0");

        assert!(store.insert_if_absent(&kernel, "/export/kernel.iso").unwrap());
        assert!(!store.insert_if_absent(&kernel, "/export/kernel.iso").unwrap());

        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn different_versions_are_distinct_rows() {
        let store = PalletStore::in_memory().unwrap();
        store.insert_if_absent(&info("kernel", "7.0"), "").unwrap();
        store.insert_if_absent(&info("kernel", "7.1"), "").unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn remove_deletes_only_the_matching_row() {
        let store = PalletStore::in_memory().unwrap();
        let seven = info("kernel", "7.0");
        let eight = info("kernel", "8.0");
        store.insert_if_absent(&seven, "").unwrap();
        store.insert_if_absent(&eight, "").unwrap();

        store.remove(&seven).unwrap();

        assert!(!store.contains(&seven).unwrap());
        assert!(store.contains(&eight).unwrap());
    }

    #[test]
    fn list_reports_the_source_url() {
        let store = PalletStore::in_memory().unwrap();
        store
            .insert_if_absent(&info("os", "7.0"), "http://mirror/os-7.0.iso")
            .unwrap();
        let records = store.list().unwrap();
        assert_eq!(records[0].url, "http://mirror/os-7.0.iso");
        assert_eq!(records[0].os, "redhat");
    }

    #[test]
    fn open_migrates_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pallets.db");
        {
            let store = PalletStore::open(&path).unwrap();
            store.insert_if_absent(&info("os", "7.0"), "").unwrap();
        }
        // reopening applies no further migrations and keeps the data
        let store = PalletStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
