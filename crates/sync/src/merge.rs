#![forbid(unsafe_code)]

use crate::document::Document;
use crate::error::SyncError;
use tally_core::model::{Entry, Tracker};
use tally_storage::SqliteStore;

/// Per-kind counters for one merge pass. Diagnostic only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub trackers_added: usize,
    pub trackers_updated: usize,
    pub entries_added: usize,
    pub entries_replaced: usize,
    pub entries_tombstoned: usize,
    pub tags_added: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        *self != Self::default()
    }
}

/// Folds a remote document into the local store, entity by entity.
///
/// Absence of an entity in the remote document is never evidence of
/// deletion — only an explicit tombstone is — so nothing local is removed
/// here. Any store failure aborts the remaining merge; there is no
/// partial-commit guarantee across entities.
pub fn merge_document(store: &mut SqliteStore, doc: &Document) -> Result<MergeStats, SyncError> {
    let mut stats = MergeStats::default();

    // The last-change marker is a diagnostic clock, adopted monotonically
    // and never consulted for per-entity decisions.
    if let Some(remote_change_ms) = doc.last_change_ms() {
        store.touch_last_change(remote_change_ms)?;
    }

    for tracker_doc in &doc.trackers {
        let remote = tracker_doc.to_tracker()?;
        merge_tracker(store, &remote, &mut stats)?;
        for entry_doc in &tracker_doc.entries {
            let remote_entry = entry_doc.to_entry(&remote.id)?;
            merge_entry(store, &remote_entry, &mut stats)?;
        }
    }

    for tag_doc in &doc.tags {
        let tag = tag_doc.to_tag();
        // Tags are write-once and only meaningful under an entry that
        // exists locally after the entry merge above.
        if store.entry(&tag.entry_id)?.is_some() && store.put_tag_if_absent(&tag)? {
            stats.tags_added += 1;
        }
    }

    log::debug!(
        "merge applied: +{}t ~{}t +{}e ~{}e x{}e +{}g",
        stats.trackers_added,
        stats.trackers_updated,
        stats.entries_added,
        stats.entries_replaced,
        stats.entries_tombstoned,
        stats.tags_added,
    );
    Ok(stats)
}

fn merge_tracker(
    store: &mut SqliteStore,
    remote: &Tracker,
    stats: &mut MergeStats,
) -> Result<(), SyncError> {
    let Some(local) = store.tracker(&remote.id)? else {
        store.put_tracker(remote)?;
        stats.trackers_added += 1;
        return Ok(());
    };

    // Metadata and tombstone merge independently. An absent remote
    // `updated_at` is a legacy payload and adopts unconditionally.
    let adopt_metadata = match (remote.updated_at_ms, local.updated_at_ms) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(remote_at), Some(local_at)) => remote_at > local_at,
    };

    let mut next = local.clone();
    if adopt_metadata {
        next.title = remote.title.clone();
        next.kind = remote.kind;
        next.is_number = remote.is_number;
        next.goal = remote.goal;
        next.parent_id = remote.parent_id.clone();
        next.updated_at_ms = remote.updated_at_ms;
    }
    // Deletions are monotonic: adopt a remote tombstone when local has
    // none, never clear a local one.
    if next.deleted_at_ms.is_none() && remote.deleted_at_ms.is_some() {
        next.deleted_at_ms = remote.deleted_at_ms;
    }

    if next != local {
        store.put_tracker(&next)?;
        stats.trackers_updated += 1;
    }
    Ok(())
}

fn merge_entry(
    store: &mut SqliteStore,
    remote: &Entry,
    stats: &mut MergeStats,
) -> Result<(), SyncError> {
    let Some(local) = store.entry(&remote.id)? else {
        store.put_entry(remote)?;
        stats.entries_added += 1;
        return Ok(());
    };

    if remote.created_at_ms > local.created_at_ms {
        // Newer logical version replaces the local record wholesale,
        // tombstone state included.
        store.put_entry(remote)?;
        stats.entries_replaced += 1;
    } else if remote.created_at_ms == local.created_at_ms {
        // Same version: records are immutable except for the sticky
        // tombstone.
        if local.deleted_at_ms.is_none() && remote.deleted_at_ms.is_some() {
            let mut next = local.clone();
            next.deleted_at_ms = remote.deleted_at_ms;
            store.put_entry(&next)?;
            stats.entries_tombstoned += 1;
        }
    }
    // Older remote versions are ignored entirely, tombstone included: a
    // device deleting the entry it last saw at T1 must not erase a
    // concurrent edit at T2 > T1 made elsewhere.
    Ok(())
}
