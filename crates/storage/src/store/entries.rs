#![forbid(unsafe_code)]

use super::*;
use std::collections::BTreeSet;
use tally_core::dates::validate_date;
use tally_core::ids::validate_entity_id;
use tally_core::model::Entry;

#[derive(Clone, Debug)]
pub struct NewEntry {
    pub id: String,
    pub tracker_id: String,
    pub date: String,
    pub value: i64,
    pub comment: Option<String>,
    pub created_at_ms: i64,
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        tracker_id: row.get(1)?,
        date: row.get(2)?,
        value: row.get(3)?,
        comment: row.get(4)?,
        created_at_ms: row.get(5)?,
        deleted_at_ms: row.get(6)?,
    })
}

const ENTRY_COLUMNS: &str = "id, tracker_id, date, value, comment, created_at_ms, deleted_at_ms";

pub(super) fn put_entry_tx(tx: &Transaction<'_>, entry: &Entry) -> Result<(), StoreError> {
    tx.execute(
        r#"
        INSERT INTO entries(id, tracker_id, date, value, comment, created_at_ms, deleted_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
          tracker_id=excluded.tracker_id,
          date=excluded.date,
          value=excluded.value,
          comment=excluded.comment,
          created_at_ms=excluded.created_at_ms,
          deleted_at_ms=excluded.deleted_at_ms
        "#,
        params![
            entry.id,
            entry.tracker_id,
            entry.date,
            entry.value,
            entry.comment,
            entry.created_at_ms,
            entry.deleted_at_ms,
        ],
    )?;
    Ok(())
}

fn parent_of_tx(tx: &Transaction<'_>, tracker_id: &str) -> Result<Option<String>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT parent_id FROM trackers WHERE id=?1",
            params![tracker_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten())
}

fn tracker_exists_tx(tx: &Transaction<'_>, tracker_id: &str) -> Result<bool, StoreError> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM trackers WHERE id=?1",
            params![tracker_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Walks the parent chain upward from `tracker_id`, excluding the tracker
/// itself. The visited set turns a misconfigured parent cycle into an error
/// instead of an endless walk; a parent that points at a missing tracker
/// ends the chain (orphans are tolerated).
fn ancestor_chain_tx(tx: &Transaction<'_>, tracker_id: &str) -> Result<Vec<String>, StoreError> {
    let mut visited = BTreeSet::new();
    visited.insert(tracker_id.to_string());
    let mut chain = Vec::new();
    let mut current = tracker_id.to_string();
    while let Some(parent) = parent_of_tx(tx, &current)? {
        if !visited.insert(parent.clone()) {
            return Err(StoreError::ParentCycle {
                tracker_id: parent,
            });
        }
        if !tracker_exists_tx(tx, &parent)? {
            break;
        }
        chain.push(parent.clone());
        current = parent;
    }
    Ok(chain)
}

impl SqliteStore {
    /// Verbatim upsert used by merge and import paths. No propagation, no
    /// tag rebuild, no last-change touch.
    pub fn put_entry(&mut self, entry: &Entry) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        put_entry_tx(&tx, entry)?;
        tx.commit()?;
        Ok(())
    }

    /// Local write path for a new observation. Validates the date, writes
    /// the entry, writes one derived entry per ancestor tracker (the value
    /// contributes up the chain; derived ids are deterministic so a re-write
    /// replaces rather than duplicates), and rebuilds the entry's tags from
    /// its comment.
    pub fn record_entry(&mut self, request: NewEntry) -> Result<Entry, StoreError> {
        validate_entity_id(&request.id)
            .map_err(|_| StoreError::InvalidInput("entry id must be a printable token"))?;
        validate_date(&request.date)
            .map_err(|_| StoreError::InvalidInput("entry date must be yyyy-MM-dd"))?;

        let tx = self.conn.transaction()?;
        if !tracker_exists_tx(&tx, &request.tracker_id)? {
            return Err(StoreError::UnknownId);
        }
        let ancestors = ancestor_chain_tx(&tx, &request.tracker_id)?;

        let entry = Entry {
            id: request.id,
            tracker_id: request.tracker_id,
            date: request.date,
            value: request.value,
            comment: request.comment,
            created_at_ms: request.created_at_ms,
            deleted_at_ms: None,
        };
        put_entry_tx(&tx, &entry)?;

        for ancestor in &ancestors {
            let derived = Entry {
                id: format!("{}@{}", entry.id, ancestor),
                tracker_id: ancestor.clone(),
                date: entry.date.clone(),
                value: entry.value,
                comment: None,
                created_at_ms: entry.created_at_ms,
                deleted_at_ms: None,
            };
            put_entry_tx(&tx, &derived)?;
        }

        super::tags::rebuild_tags_tx(&tx, &entry)?;
        touch_last_change_tx(&tx, entry.created_at_ms)?;
        tx.commit()?;
        Ok(entry)
    }

    /// Tombstone write; sticky like tracker deletion.
    pub fn delete_entry(&mut self, id: &str, at_ms: i64) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx
            .query_row("SELECT 1 FROM entries WHERE id=?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownId);
        }
        tx.execute(
            "UPDATE entries SET deleted_at_ms=?2 WHERE id=?1 AND deleted_at_ms IS NULL",
            params![id, at_ms],
        )?;
        touch_last_change_tx(&tx, at_ms)?;
        tx.commit()?;
        Ok(())
    }

    pub fn entry(&self, id: &str) -> Result<Option<Entry>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?)
    }

    /// Indexed scan over a tracker's entries, ordered for deterministic
    /// exports.
    pub fn entries_for_tracker(
        &self,
        tracker_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Entry>, StoreError> {
        let sql = if include_deleted {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM entries WHERE tracker_id = ?1 \
                 ORDER BY date ASC, created_at_ms ASC, id ASC"
            )
        } else {
            format!(
                "SELECT {ENTRY_COLUMNS} FROM entries WHERE tracker_id = ?1 AND deleted_at_ms IS NULL \
                 ORDER BY date ASC, created_at_ms ASC, id ASC"
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tracker_id], entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Sum of non-deleted entry values for a tracker on one date.
    pub fn value_for_date(&self, tracker_id: &str, date: &str) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(value), 0) FROM entries \
             WHERE tracker_id=?1 AND date=?2 AND deleted_at_ms IS NULL",
            params![tracker_id, date],
            |row| row.get(0),
        )?)
    }
}
