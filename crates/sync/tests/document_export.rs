#![forbid(unsafe_code)]

use std::path::PathBuf;
use tally_core::model::TrackerKind;
use tally_storage::{NewEntry, NewTracker, SqliteStore};
use tally_sync::{Document, export_document, import_replace};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("tally_doc_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn seeded_store(test_name: &str) -> SqliteStore {
    let mut store = SqliteStore::open(temp_dir(test_name)).expect("open store");
    store
        .create_tracker(
            NewTracker {
                id: "water".to_string(),
                title: "Water".to_string(),
                kind: TrackerKind::Count,
                is_number: true,
                goal: Some(8),
                parent_id: None,
            },
            1_000,
        )
        .expect("tracker");
    store
        .record_entry(NewEntry {
            id: "morning".to_string(),
            tracker_id: "water".to_string(),
            date: "2024-03-15".to_string(),
            value: 2,
            comment: Some("after the #Run".to_string()),
            created_at_ms: 1_500,
        })
        .expect("entry");
    store
}

#[test]
fn export_uses_the_documented_wire_keys() {
    let store = seeded_store("wire_keys");
    let doc = export_document(&store).expect("export");
    let wire = serde_json::to_value(&doc).expect("to_value");

    assert_eq!(wire["version"], "2");
    assert!(wire.get("exportDate").is_some());
    assert!(wire.get("lastChangeDate").is_some());

    let tracker = &wire["trackers"][0];
    assert_eq!(tracker["id"], "water");
    assert_eq!(tracker["type"], "count");
    assert_eq!(tracker["isNumber"], true);
    assert_eq!(tracker["goal"], 8);
    assert!(tracker.get("deletedAt").is_none(), "absent fields stay off the wire");
    assert!(tracker.get("updatedAt").is_some());

    let entry = &tracker["entries"][0];
    assert_eq!(entry["id"], "morning");
    assert!(entry.get("createdAt").is_some());

    let tag = &wire["tags"][0];
    assert_eq!(tag["tagName"], "run");
    assert_eq!(tag["tagNameWithOriginalCasing"], "Run");
    assert_eq!(tag["entryId"], "morning");
}

#[test]
fn export_keeps_tombstoned_records() {
    let mut store = seeded_store("tombstones_kept");
    store.delete_entry("morning", 9_000).expect("delete entry");
    store.delete_tracker("water", 9_500).expect("delete tracker");

    let doc = export_document(&store).expect("export");
    assert_eq!(doc.trackers.len(), 1);
    assert!(doc.trackers[0].deleted_at.is_some());
    assert_eq!(doc.trackers[0].entries.len(), 1);
    assert!(doc.trackers[0].entries[0].deleted_at.is_some());
}

#[test]
fn export_import_round_trips_through_another_store() {
    let source = seeded_store("round_trip_src");
    let doc = export_document(&source).expect("export");

    let mut target = SqliteStore::open(temp_dir("round_trip_dst")).expect("open target");
    import_replace(&mut target, &doc).expect("import");

    assert_eq!(
        source.list_trackers(true).expect("src trackers"),
        target.list_trackers(true).expect("dst trackers")
    );
    assert_eq!(
        source.entries_for_tracker("water", true).expect("src entries"),
        target.entries_for_tracker("water", true).expect("dst entries")
    );
    assert_eq!(source.list_tags().expect("src tags"), target.list_tags().expect("dst tags"));
    assert_eq!(
        source.last_change_ms().expect("src clock"),
        target.last_change_ms().expect("dst clock")
    );
}

#[test]
fn import_replace_discards_everything_not_in_the_document() {
    let mut store = seeded_store("import_discards");
    let incoming = Document {
        version: "2".to_string(),
        export_date: "2024-06-01T00:00:00Z".to_string(),
        last_change_date: Some("2024-06-01T00:00:00Z".to_string()),
        trackers: Vec::new(),
        tags: Vec::new(),
    };

    import_replace(&mut store, &incoming).expect("import");
    assert!(store.list_trackers(true).expect("trackers").is_empty());
    assert!(store.entry("morning").expect("entry").is_none());
    assert!(store.list_tags().expect("tags").is_empty());
}

#[test]
fn unknown_tracker_kind_degrades_to_custom_on_import() {
    let mut store = SqliteStore::open(temp_dir("unknown_kind")).expect("open store");
    let doc = Document::from_value(serde_json::json!({
        "version": "2",
        "exportDate": "2024-06-01T00:00:00Z",
        "trackers": [{
            "id": "mood",
            "title": "Mood",
            "type": "sentiment-v9",
            "isNumber": false,
            "entries": [],
        }],
    }))
    .expect("typed document");

    import_replace(&mut store, &doc).expect("import");
    let tracker = store.tracker("mood").expect("get").expect("row");
    assert_eq!(tracker.kind, TrackerKind::Custom);
}

#[test]
fn non_document_payloads_are_a_format_error() {
    assert!(Document::from_value(serde_json::json!({"hello": "world"})).is_err());
    assert!(Document::from_value(serde_json::json!({"version": 2, "trackers": []})).is_err());
    assert!(Document::from_value(serde_json::json!([1, 2, 3])).is_err());
}

#[test]
fn legacy_documents_without_tags_or_timestamps_still_parse() {
    let doc = Document::from_value(serde_json::json!({
        "version": "1",
        "exportDate": "2023-01-01T00:00:00Z",
        "trackers": [{
            "id": "steps",
            "title": "Steps",
            "type": "count",
            "isNumber": true,
            "entries": [{
                "id": "walk",
                "date": "2023-01-01",
                "value": 4000,
                "createdAt": "2023-01-01T12:00:00Z",
            }],
        }],
    }))
    .expect("legacy document");

    assert!(doc.tags.is_empty());
    assert!(doc.last_change_ms().is_none());
    let tracker = doc.trackers[0].to_tracker().expect("typed tracker");
    assert!(tracker.updated_at_ms.is_none());
}
