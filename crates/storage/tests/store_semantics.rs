#![forbid(unsafe_code)]

use std::path::PathBuf;
use tally_core::model::{Entry, Tag, Tracker, TrackerKind};
use tally_storage::{NewEntry, NewTracker, SqliteStore, StoreError};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tally_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn new_tracker(id: &str, parent_id: Option<&str>) -> NewTracker {
    NewTracker {
        id: id.to_string(),
        title: format!("Tracker {id}"),
        kind: TrackerKind::Count,
        is_number: true,
        goal: None,
        parent_id: parent_id.map(|p| p.to_string()),
    }
}

fn new_entry(id: &str, tracker_id: &str, value: i64, comment: Option<&str>) -> NewEntry {
    NewEntry {
        id: id.to_string(),
        tracker_id: tracker_id.to_string(),
        date: "2024-03-15".to_string(),
        value,
        comment: comment.map(|c| c.to_string()),
        created_at_ms: 1_000,
    }
}

#[test]
fn tracker_deletion_is_a_sticky_tombstone() {
    let mut store = SqliteStore::open(temp_dir("tracker_tombstone")).expect("open store");
    store
        .create_tracker(new_tracker("t1", None), 100)
        .expect("create tracker");

    store.delete_tracker("t1", 200).expect("delete tracker");
    store.delete_tracker("t1", 900).expect("second delete");

    let tracker = store.tracker("t1").expect("get").expect("tracker row");
    assert_eq!(tracker.deleted_at_ms, Some(200), "first tombstone wins");
    assert!(
        store.list_trackers(false).expect("active list").is_empty(),
        "tombstoned tracker hidden from active scans"
    );
    assert_eq!(store.list_trackers(true).expect("full list").len(), 1);
}

#[test]
fn record_entry_propagates_up_the_parent_chain() {
    let mut store = SqliteStore::open(temp_dir("entry_propagation")).expect("open store");
    store
        .create_tracker(new_tracker("root", None), 100)
        .expect("create root");
    store
        .create_tracker(new_tracker("mid", Some("root")), 100)
        .expect("create mid");
    store
        .create_tracker(new_tracker("leaf", Some("mid")), 100)
        .expect("create leaf");

    store
        .record_entry(new_entry("e1", "leaf", 50, None))
        .expect("record entry");

    assert_eq!(store.value_for_date("leaf", "2024-03-15").expect("leaf sum"), 50);
    assert_eq!(store.value_for_date("mid", "2024-03-15").expect("mid sum"), 50);
    assert_eq!(store.value_for_date("root", "2024-03-15").expect("root sum"), 50);

    // Re-recording the same entry replaces the derived entries too.
    store
        .record_entry(new_entry("e1", "leaf", 70, None))
        .expect("re-record entry");
    assert_eq!(store.value_for_date("root", "2024-03-15").expect("root sum"), 70);
}

#[test]
fn parent_cycle_is_detected_not_walked_forever() {
    let mut store = SqliteStore::open(temp_dir("parent_cycle")).expect("open store");
    store
        .create_tracker(new_tracker("a", Some("b")), 100)
        .expect("create a");
    store
        .create_tracker(new_tracker("b", Some("a")), 100)
        .expect("create b");

    let err = store
        .record_entry(new_entry("e1", "a", 10, None))
        .expect_err("cycle should fail");
    assert!(matches!(err, StoreError::ParentCycle { .. }), "got {err:?}");
}

#[test]
fn missing_parent_ends_the_chain_as_an_orphan() {
    let mut store = SqliteStore::open(temp_dir("orphan_parent")).expect("open store");
    store
        .create_tracker(new_tracker("child", Some("gone")), 100)
        .expect("create child");

    store
        .record_entry(new_entry("e1", "child", 5, None))
        .expect("record entry despite missing parent");
    assert_eq!(store.value_for_date("child", "2024-03-15").expect("sum"), 5);
}

#[test]
fn tags_are_rebuilt_when_a_comment_is_rewritten() {
    let mut store = SqliteStore::open(temp_dir("tags_rebuild")).expect("open store");
    store
        .create_tracker(new_tracker("t1", None), 100)
        .expect("create tracker");

    store
        .record_entry(new_entry("e1", "t1", 1, Some("felt great #Morning #run")))
        .expect("record entry");
    let tags = store.tags_for_entry("e1").expect("tags");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].tag_name, "morning");
    assert_eq!(tags[0].tag_name_original.as_deref(), Some("Morning"));

    store
        .record_entry(new_entry("e1", "t1", 1, Some("only #run now")))
        .expect("rewrite comment");
    let tags = store.tags_for_entry("e1").expect("tags after rewrite");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag_name, "run");
}

#[test]
fn first_seen_tag_casing_wins_per_tracker() {
    let mut store = SqliteStore::open(temp_dir("tag_casing")).expect("open store");
    store
        .create_tracker(new_tracker("t1", None), 100)
        .expect("create tracker");

    store
        .record_entry(new_entry("e1", "t1", 1, Some("#Sunrise")))
        .expect("first entry");
    store
        .record_entry(new_entry("e2", "t1", 1, Some("#SUNRISE")))
        .expect("second entry");

    let tags = store.tags_for_entry("e2").expect("tags");
    assert_eq!(tags.len(), 1);
    assert_eq!(
        tags[0].tag_name_original.as_deref(),
        Some("Sunrise"),
        "later casings do not replace the first-seen one"
    );
}

#[test]
fn entry_tombstone_is_sticky_and_excluded_from_sums() {
    let mut store = SqliteStore::open(temp_dir("entry_tombstone")).expect("open store");
    store
        .create_tracker(new_tracker("t1", None), 100)
        .expect("create tracker");
    store
        .record_entry(new_entry("e1", "t1", 10, None))
        .expect("record entry");

    store.delete_entry("e1", 2_000).expect("delete entry");
    store.delete_entry("e1", 9_000).expect("second delete");

    let entry = store.entry("e1").expect("get").expect("entry row");
    assert_eq!(entry.deleted_at_ms, Some(2_000));
    assert_eq!(store.value_for_date("t1", "2024-03-15").expect("sum"), 0);
}

#[test]
fn last_change_marker_is_monotonic() {
    let store = SqliteStore::open(temp_dir("last_change")).expect("open store");
    store.touch_last_change(500).expect("touch");
    store.touch_last_change(300).expect("older touch");
    assert_eq!(store.last_change_ms().expect("read"), Some(500));
    store.touch_last_change(800).expect("newer touch");
    assert_eq!(store.last_change_ms().expect("read"), Some(800));
}

#[test]
fn replace_all_rewrites_everything_verbatim() {
    let mut store = SqliteStore::open(temp_dir("replace_all")).expect("open store");
    store
        .create_tracker(new_tracker("old", None), 100)
        .expect("create tracker");
    store
        .record_entry(new_entry("e_old", "old", 1, Some("#stale")))
        .expect("record entry");

    let trackers = vec![Tracker {
        id: "fresh".to_string(),
        title: "Fresh".to_string(),
        kind: TrackerKind::Amount,
        is_number: true,
        goal: Some(10),
        parent_id: None,
        updated_at_ms: Some(1_234),
        deleted_at_ms: Some(5_678),
    }];
    let entries = vec![Entry {
        id: "e_fresh".to_string(),
        tracker_id: "fresh".to_string(),
        date: "2024-01-01".to_string(),
        value: 3,
        comment: None,
        created_at_ms: 1_200,
        deleted_at_ms: None,
    }];
    let tags = vec![Tag {
        id: "tag1".to_string(),
        entry_id: "e_fresh".to_string(),
        tracker_id: "fresh".to_string(),
        tag_name: "fresh".to_string(),
        tag_name_original: Some("Fresh".to_string()),
    }];

    store
        .replace_all(&trackers, &entries, &tags, Some(9_000))
        .expect("replace all");

    assert!(store.tracker("old").expect("old gone").is_none());
    let fresh = store.tracker("fresh").expect("get").expect("fresh tracker");
    assert_eq!(fresh.deleted_at_ms, Some(5_678), "tombstones imported verbatim");
    assert_eq!(store.entry("e_fresh").expect("entry").map(|e| e.value), Some(3));
    assert_eq!(store.list_tags().expect("tags").len(), 1);
    assert_eq!(store.last_change_ms().expect("marker"), Some(9_000));
}

#[test]
fn clear_all_is_the_only_physical_deletion() {
    let mut store = SqliteStore::open(temp_dir("clear_all")).expect("open store");
    store
        .create_tracker(new_tracker("t1", None), 100)
        .expect("create tracker");
    store
        .record_entry(new_entry("e1", "t1", 1, Some("#gone")))
        .expect("record entry");

    store.clear_all().expect("clear all");

    assert!(store.list_trackers(true).expect("trackers").is_empty());
    assert!(store.entry("e1").expect("entry").is_none());
    assert!(store.list_tags().expect("tags").is_empty());
    assert_eq!(store.last_change_ms().expect("marker"), None);
}

#[test]
fn invalid_dates_and_ids_are_rejected_on_the_local_write_path() {
    let mut store = SqliteStore::open(temp_dir("validation")).expect("open store");
    store
        .create_tracker(new_tracker("t1", None), 100)
        .expect("create tracker");

    let mut bad_date = new_entry("e1", "t1", 1, None);
    bad_date.date = "2024-02-30".to_string();
    assert!(matches!(
        store.record_entry(bad_date),
        Err(StoreError::InvalidInput(_))
    ));

    let bad_id = new_entry("has space", "t1", 1, None);
    assert!(matches!(
        store.record_entry(bad_id),
        Err(StoreError::InvalidInput(_))
    ));

    assert!(matches!(
        store.record_entry(new_entry("e2", "nope", 1, None)),
        Err(StoreError::UnknownId)
    ));
}
