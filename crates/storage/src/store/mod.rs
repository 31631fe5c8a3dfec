#![forbid(unsafe_code)]

mod entries;
mod error;
mod tags;
mod trackers;

pub use entries::NewEntry;
pub use error::StoreError;
pub use trackers::NewTracker;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_core::model::{Entry, Tag, Tracker};

const SCHEMA_VERSION: &str = "1";
const META_SCHEMA_VERSION: &str = "schema_version";
const META_LAST_CHANGE_MS: &str = "last_change_ms";
const META_LAST_SYNC_MS: &str = "last_sync_ms";
const META_SYNCED_ONCE: &str = "synced_once";

/// Entity Store Adapter over the local SQLite database. The sync engine is
/// the only writer during a merge; tombstones are rows with `deleted_at_ms`
/// set and are never physically removed except by `clear_all`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join("tally.db");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let store = Self { conn, storage_dir };
        store.install_schema()?;
        Ok(store)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn install_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS meta (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trackers (
              id TEXT PRIMARY KEY,
              title TEXT NOT NULL,
              kind TEXT NOT NULL,
              is_number INTEGER NOT NULL,
              goal INTEGER,
              parent_id TEXT,
              updated_at_ms INTEGER,
              deleted_at_ms INTEGER
            );

            CREATE TABLE IF NOT EXISTS entries (
              id TEXT PRIMARY KEY,
              tracker_id TEXT NOT NULL,
              date TEXT NOT NULL,
              value INTEGER NOT NULL,
              comment TEXT,
              created_at_ms INTEGER NOT NULL,
              deleted_at_ms INTEGER
            );

            CREATE TABLE IF NOT EXISTS tags (
              id TEXT PRIMARY KEY,
              entry_id TEXT NOT NULL,
              tracker_id TEXT NOT NULL,
              tag_name TEXT NOT NULL,
              tag_name_original TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_entries_tracker ON entries(tracker_id);
            CREATE INDEX IF NOT EXISTS idx_entries_tracker_date ON entries(tracker_id, date);
            CREATE INDEX IF NOT EXISTS idx_tags_entry ON tags(entry_id);
            CREATE INDEX IF NOT EXISTS idx_tags_tracker_name ON tags(tracker_id, tag_name);
            "#,
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION, SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO meta(key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Timestamp of the last local mutation. Diagnostic only; entity-level
    /// conflict decisions never consult it.
    pub fn last_change_ms(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .get_meta(META_LAST_CHANGE_MS)?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    /// Monotonic adopt: an older timestamp never rolls the marker back.
    pub fn touch_last_change(&self, at_ms: i64) -> Result<(), StoreError> {
        let current = self.last_change_ms()?.unwrap_or(0);
        if at_ms > current {
            self.set_meta(META_LAST_CHANGE_MS, &at_ms.to_string())?;
        }
        Ok(())
    }

    pub fn last_sync_ms(&self) -> Result<Option<i64>, StoreError> {
        Ok(self
            .get_meta(META_LAST_SYNC_MS)?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    pub fn set_last_sync_ms(&self, at_ms: i64) -> Result<(), StoreError> {
        self.set_meta(META_LAST_SYNC_MS, &at_ms.to_string())
    }

    pub fn synced_once(&self) -> Result<bool, StoreError> {
        Ok(self.get_meta(META_SYNCED_ONCE)?.as_deref() == Some("1"))
    }

    pub fn mark_synced_once(&self) -> Result<(), StoreError> {
        self.set_meta(META_SYNCED_ONCE, "1")
    }

    /// Administrative wipe. This is the only physical deletion in the store;
    /// everything else tombstones.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tags", [])?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM trackers", [])?;
        tx.execute("DELETE FROM meta WHERE key = ?1", params![META_LAST_CHANGE_MS])?;
        tx.commit()?;
        Ok(())
    }

    /// Replace-everything import: wipes the entity tables and writes the
    /// given records verbatim, tombstones included, in one transaction.
    pub fn replace_all(
        &mut self,
        trackers: &[Tracker],
        entries: &[Entry],
        tags: &[Tag],
        last_change_ms: Option<i64>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tags", [])?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM trackers", [])?;
        for tracker in trackers {
            trackers::put_tracker_tx(&tx, tracker)?;
        }
        for entry in entries {
            entries::put_entry_tx(&tx, entry)?;
        }
        for tag in tags {
            tags::put_tag_if_absent_tx(&tx, tag)?;
        }
        match last_change_ms {
            Some(at_ms) => {
                tx.execute(
                    r#"
                    INSERT INTO meta(key, value) VALUES (?1, ?2)
                    ON CONFLICT(key) DO UPDATE SET value=excluded.value
                    "#,
                    params![META_LAST_CHANGE_MS, at_ms.to_string()],
                )?;
            }
            None => {
                tx.execute("DELETE FROM meta WHERE key = ?1", params![META_LAST_CHANGE_MS])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

pub fn now_ms() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    now.as_millis() as i64
}

fn touch_last_change_tx(tx: &Transaction<'_>, at_ms: i64) -> Result<(), StoreError> {
    let current: Option<String> = tx
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![META_LAST_CHANGE_MS],
            |row| row.get(0),
        )
        .optional()?;
    let current = current.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
    if at_ms > current {
        tx.execute(
            r#"
            INSERT INTO meta(key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![META_LAST_CHANGE_MS, at_ms.to_string()],
        )?;
    }
    Ok(())
}
