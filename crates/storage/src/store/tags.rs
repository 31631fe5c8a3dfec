#![forbid(unsafe_code)]

use super::*;
use rusqlite::OptionalExtension;
use tally_core::model::{Entry, Tag};
use tally_core::tags::extract_tags;

fn tag_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        entry_id: row.get(1)?,
        tracker_id: row.get(2)?,
        tag_name: row.get(3)?,
        tag_name_original: row.get(4)?,
    })
}

const TAG_COLUMNS: &str = "id, entry_id, tracker_id, tag_name, tag_name_original";

pub(super) fn put_tag_if_absent_tx(tx: &Transaction<'_>, tag: &Tag) -> Result<bool, StoreError> {
    let inserted = tx.execute(
        r#"
        INSERT OR IGNORE INTO tags(id, entry_id, tracker_id, tag_name, tag_name_original)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            tag.id,
            tag.entry_id,
            tag.tracker_id,
            tag.tag_name,
            tag.tag_name_original,
        ],
    )?;
    Ok(inserted > 0)
}

fn first_seen_casing_tx(
    tx: &Transaction<'_>,
    tracker_id: &str,
    tag_name: &str,
) -> Result<Option<String>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT tag_name_original FROM tags \
             WHERE tracker_id=?1 AND tag_name=?2 AND tag_name_original IS NOT NULL \
             LIMIT 1",
            params![tracker_id, tag_name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten())
}

/// Tags have no lifecycle of their own: whenever an entry's comment is
/// (re)written its tag rows are dropped and recreated. The display casing
/// for a tracker+tag pair is whatever casing was seen first.
pub(super) fn rebuild_tags_tx(tx: &Transaction<'_>, entry: &Entry) -> Result<(), StoreError> {
    tx.execute("DELETE FROM tags WHERE entry_id = ?1", params![entry.id])?;
    let Some(comment) = entry.comment.as_deref() else {
        return Ok(());
    };
    for token in extract_tags(comment) {
        let original = first_seen_casing_tx(tx, &entry.tracker_id, &token.normalized)?
            .unwrap_or(token.original);
        let tag = Tag {
            id: format!("{}#{}", entry.id, token.normalized),
            entry_id: entry.id.clone(),
            tracker_id: entry.tracker_id.clone(),
            tag_name: token.normalized,
            tag_name_original: Some(original),
        };
        put_tag_if_absent_tx(tx, &tag)?;
    }
    Ok(())
}

impl SqliteStore {
    /// Write-once insert used by merge: returns false when a tag with the
    /// same id already exists (existing rows are never overwritten).
    pub fn put_tag_if_absent(&mut self, tag: &Tag) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let inserted = put_tag_if_absent_tx(&tx, tag)?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn tag(&self, id: &str) -> Result<Option<Tag>, StoreError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"),
                params![id],
                tag_from_row,
            )
            .optional()?)
    }

    pub fn tags_for_entry(&self, entry_id: &str) -> Result<Vec<Tag>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE entry_id = ?1 ORDER BY tag_name ASC"
        ))?;
        let rows = stmt.query_map(params![entry_id], tag_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY id ASC"))?;
        let rows = stmt.query_map([], tag_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
