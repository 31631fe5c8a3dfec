#![forbid(unsafe_code)]

use crate::error::SyncError;
use crate::timefmt::{now_ms, rfc3339_to_ms, ts_ms_to_rfc3339};
use serde::{Deserialize, Serialize};
use tally_core::model::{Entry, Tag, Tracker, TrackerKind};
use tally_storage::SqliteStore;

pub const DOCUMENT_VERSION: &str = "2";

/// Portable snapshot of the whole local dataset, tombstones included.
/// Filtering for "active" views is a presentation concern; nothing is ever
/// dropped here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: String,
    pub export_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change_date: Option<String>,
    pub trackers: Vec<TrackerDoc>,
    #[serde(default)]
    pub tags: Vec<TagDoc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerDoc {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_number: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub entries: Vec<EntryDoc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDoc {
    pub id: String,
    pub date: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDoc {
    pub id: String,
    pub entry_id: String,
    pub tracker_id: String,
    pub tag_name: String,
    #[serde(
        rename = "tagNameWithOriginalCasing",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tag_name_original: Option<String>,
}

impl Document {
    /// Cheap structural check used before typed deserialization so a bogus
    /// remote payload is reported as a format error, never merged.
    pub fn looks_like_document(value: &serde_json::Value) -> bool {
        value.get("version").map(|v| v.is_string()).unwrap_or(false)
            && value.get("trackers").map(|v| v.is_array()).unwrap_or(false)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, SyncError> {
        if !Self::looks_like_document(&value) {
            return Err(SyncError::InvalidRemoteFormat(
                "payload is not a sync document",
            ));
        }
        serde_json::from_value(value)
            .map_err(|_| SyncError::InvalidRemoteFormat("document shape mismatch"))
    }

    pub fn last_change_ms(&self) -> Option<i64> {
        self.last_change_date.as_deref().and_then(rfc3339_to_ms)
    }
}

impl TrackerDoc {
    /// Legacy exporters omitted `updatedAt`; an absent or unparseable value
    /// maps to `None`, which the merge treats as the backward-compat
    /// "adopt remote metadata" default. Tombstones parse strictly: a
    /// deletion marker we cannot read must fail loudly, not vanish.
    pub fn to_tracker(&self) -> Result<Tracker, SyncError> {
        Ok(Tracker {
            id: self.id.clone(),
            title: self.title.clone(),
            kind: TrackerKind::from_wire(&self.kind),
            is_number: self.is_number,
            goal: self.goal,
            parent_id: self.parent_id.clone(),
            updated_at_ms: self.updated_at.as_deref().and_then(rfc3339_to_ms),
            deleted_at_ms: parse_tombstone(self.deleted_at.as_deref())?,
        })
    }
}

impl EntryDoc {
    pub fn to_entry(&self, tracker_id: &str) -> Result<Entry, SyncError> {
        let created_at_ms = rfc3339_to_ms(&self.created_at).ok_or(
            SyncError::InvalidRemoteFormat("entry createdAt is not a timestamp"),
        )?;
        Ok(Entry {
            id: self.id.clone(),
            tracker_id: tracker_id.to_string(),
            date: self.date.clone(),
            value: self.value,
            comment: self.comment.clone(),
            created_at_ms,
            deleted_at_ms: parse_tombstone(self.deleted_at.as_deref())?,
        })
    }
}

impl TagDoc {
    pub fn to_tag(&self) -> Tag {
        Tag {
            id: self.id.clone(),
            entry_id: self.entry_id.clone(),
            tracker_id: self.tracker_id.clone(),
            tag_name: self.tag_name.clone(),
            tag_name_original: self.tag_name_original.clone(),
        }
    }
}

fn parse_tombstone(value: Option<&str>) -> Result<Option<i64>, SyncError> {
    match value {
        None => Ok(None),
        Some(text) => rfc3339_to_ms(text)
            .map(Some)
            .ok_or(SyncError::InvalidRemoteFormat(
                "deletedAt is not a timestamp",
            )),
    }
}

fn tracker_to_doc(tracker: &Tracker, entries: Vec<EntryDoc>) -> TrackerDoc {
    TrackerDoc {
        id: tracker.id.clone(),
        title: tracker.title.clone(),
        kind: tracker.kind.as_str().to_string(),
        is_number: tracker.is_number,
        goal: tracker.goal,
        parent_id: tracker.parent_id.clone(),
        updated_at: tracker.updated_at_ms.map(ts_ms_to_rfc3339),
        deleted_at: tracker.deleted_at_ms.map(ts_ms_to_rfc3339),
        entries,
    }
}

fn entry_to_doc(entry: &Entry) -> EntryDoc {
    EntryDoc {
        id: entry.id.clone(),
        date: entry.date.clone(),
        value: entry.value,
        comment: entry.comment.clone(),
        created_at: ts_ms_to_rfc3339(entry.created_at_ms),
        deleted_at: entry.deleted_at_ms.map(ts_ms_to_rfc3339),
    }
}

fn tag_to_doc(tag: &Tag) -> TagDoc {
    TagDoc {
        id: tag.id.clone(),
        entry_id: tag.entry_id.clone(),
        tracker_id: tag.tracker_id.clone(),
        tag_name: tag.tag_name.clone(),
        tag_name_original: tag.tag_name_original.clone(),
    }
}

/// Serializes the full local entity set, soft-deleted records included,
/// via the store's indexed scans.
pub fn export_document(store: &SqliteStore) -> Result<Document, SyncError> {
    let mut trackers = Vec::new();
    for tracker in store.list_trackers(true)? {
        let entries = store
            .entries_for_tracker(&tracker.id, true)?
            .iter()
            .map(entry_to_doc)
            .collect();
        trackers.push(tracker_to_doc(&tracker, entries));
    }
    let tags = store.list_tags()?.iter().map(tag_to_doc).collect();
    Ok(Document {
        version: DOCUMENT_VERSION.to_string(),
        export_date: ts_ms_to_rfc3339(now_ms()),
        last_change_date: store.last_change_ms()?.map(ts_ms_to_rfc3339),
        trackers,
        tags,
    })
}

/// Replace-everything import mode, not a merge: wipes the store and writes
/// every record from the document verbatim inside one transaction.
pub fn import_replace(store: &mut SqliteStore, doc: &Document) -> Result<(), SyncError> {
    let mut trackers = Vec::new();
    let mut entries = Vec::new();
    for tracker_doc in &doc.trackers {
        let tracker = tracker_doc.to_tracker()?;
        for entry_doc in &tracker_doc.entries {
            entries.push(entry_doc.to_entry(&tracker.id)?);
        }
        trackers.push(tracker);
    }
    let tags: Vec<Tag> = doc.tags.iter().map(TagDoc::to_tag).collect();
    store.replace_all(&trackers, &entries, &tags, doc.last_change_ms())?;
    Ok(())
}
