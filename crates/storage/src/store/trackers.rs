#![forbid(unsafe_code)]

use super::*;
use tally_core::ids::validate_entity_id;
use tally_core::model::{Tracker, TrackerKind};

#[derive(Clone, Debug)]
pub struct NewTracker {
    pub id: String,
    pub title: String,
    pub kind: TrackerKind,
    pub is_number: bool,
    pub goal: Option<i64>,
    pub parent_id: Option<String>,
}

fn tracker_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tracker> {
    Ok(Tracker {
        id: row.get(0)?,
        title: row.get(1)?,
        kind: TrackerKind::from_wire(&row.get::<_, String>(2)?),
        is_number: row.get::<_, i64>(3)? != 0,
        goal: row.get(4)?,
        parent_id: row.get(5)?,
        updated_at_ms: row.get(6)?,
        deleted_at_ms: row.get(7)?,
    })
}

const TRACKER_COLUMNS: &str =
    "id, title, kind, is_number, goal, parent_id, updated_at_ms, deleted_at_ms";

pub(super) fn put_tracker_tx(tx: &Transaction<'_>, tracker: &Tracker) -> Result<(), StoreError> {
    tx.execute(
        r#"
        INSERT INTO trackers(id, title, kind, is_number, goal, parent_id, updated_at_ms, deleted_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
          title=excluded.title,
          kind=excluded.kind,
          is_number=excluded.is_number,
          goal=excluded.goal,
          parent_id=excluded.parent_id,
          updated_at_ms=excluded.updated_at_ms,
          deleted_at_ms=excluded.deleted_at_ms
        "#,
        params![
            tracker.id,
            tracker.title,
            tracker.kind.as_str(),
            tracker.is_number as i64,
            tracker.goal,
            tracker.parent_id,
            tracker.updated_at_ms,
            tracker.deleted_at_ms,
        ],
    )?;
    Ok(())
}

impl SqliteStore {
    /// Verbatim upsert used by merge and import paths. Does not bump
    /// `updated_at_ms` or the last-change marker; the caller already holds
    /// the authoritative timestamps.
    pub fn put_tracker(&mut self, tracker: &Tracker) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        put_tracker_tx(&tx, tracker)?;
        tx.commit()?;
        Ok(())
    }

    /// Local creation path: validates the id and stamps `updated_at_ms`.
    pub fn create_tracker(&mut self, request: NewTracker, at_ms: i64) -> Result<Tracker, StoreError> {
        validate_entity_id(&request.id)
            .map_err(|_| StoreError::InvalidInput("tracker id must be a printable token"))?;
        if request.title.trim().is_empty() {
            return Err(StoreError::InvalidInput("tracker title must not be empty"));
        }
        let tracker = Tracker {
            id: request.id,
            title: request.title,
            kind: request.kind,
            is_number: request.is_number,
            goal: request.goal,
            parent_id: request.parent_id,
            updated_at_ms: Some(at_ms),
            deleted_at_ms: None,
        };
        let tx = self.conn.transaction()?;
        put_tracker_tx(&tx, &tracker)?;
        touch_last_change_tx(&tx, at_ms)?;
        tx.commit()?;
        Ok(tracker)
    }

    pub fn rename_tracker(&mut self, id: &str, title: &str, at_ms: i64) -> Result<(), StoreError> {
        if title.trim().is_empty() {
            return Err(StoreError::InvalidInput("tracker title must not be empty"));
        }
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE trackers SET title=?2, updated_at_ms=?3 WHERE id=?1",
            params![id, title, at_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownId);
        }
        touch_last_change_tx(&tx, at_ms)?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_tracker_goal(
        &mut self,
        id: &str,
        goal: Option<i64>,
        at_ms: i64,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE trackers SET goal=?2, updated_at_ms=?3 WHERE id=?1",
            params![id, goal, at_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownId);
        }
        touch_last_change_tx(&tx, at_ms)?;
        tx.commit()?;
        Ok(())
    }

    /// Tombstone write. Sticky: a tracker that already carries a tombstone
    /// keeps its original deletion timestamp.
    pub fn delete_tracker(&mut self, id: &str, at_ms: i64) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx
            .query_row("SELECT 1 FROM trackers WHERE id=?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownId);
        }
        tx.execute(
            "UPDATE trackers SET deleted_at_ms=?2 WHERE id=?1 AND deleted_at_ms IS NULL",
            params![id, at_ms],
        )?;
        touch_last_change_tx(&tx, at_ms)?;
        tx.commit()?;
        Ok(())
    }

    pub fn tracker(&self, id: &str) -> Result<Option<Tracker>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {TRACKER_COLUMNS} FROM trackers WHERE id = ?1"),
                params![id],
                tracker_from_row,
            )
            .optional()?)
    }

    pub fn list_trackers(&self, include_deleted: bool) -> Result<Vec<Tracker>, StoreError> {
        let sql = if include_deleted {
            format!("SELECT {TRACKER_COLUMNS} FROM trackers ORDER BY id ASC")
        } else {
            format!(
                "SELECT {TRACKER_COLUMNS} FROM trackers WHERE deleted_at_ms IS NULL ORDER BY id ASC"
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], tracker_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
