#![forbid(unsafe_code)]

use serde_json::json;
use tally_sync::envelope::{is_envelope, open, seal, ENVELOPE_VERSION};
use tally_sync::error::CryptoError;

fn sample_payload() -> serde_json::Value {
    json!({
        "version": "2",
        "exportDate": "2024-06-01T00:00:00Z",
        "trackers": [{
            "id": "water",
            "title": "Water",
            "type": "count",
            "isNumber": true,
            "entries": [],
        }],
    })
}

#[test]
fn sealed_payload_opens_with_the_same_secret() {
    let plain = sample_payload();
    let envelope = seal(&plain, "hunter2").expect("seal");

    assert!(envelope.encrypted);
    assert_eq!(envelope.version, ENVELOPE_VERSION);
    assert!(!envelope.data.contains("Water"), "no plaintext leaks");

    let opened = open(&envelope, "hunter2").expect("open");
    assert_eq!(opened, plain);
}

#[test]
fn sealing_twice_never_repeats_ciphertext() {
    let plain = sample_payload();
    let a = seal(&plain, "hunter2").expect("seal a");
    let b = seal(&plain, "hunter2").expect("seal b");
    assert_ne!(a.data, b.data, "fresh salt and nonce per call");
    assert_eq!(a.token_hash, b.token_hash);
}

#[test]
fn awkward_payloads_survive_the_round_trip() {
    let long_comment: String = "а ну ещё раз 🏃".repeat(700);
    let cases = [
        json!(""),
        json!({"comment": "után jött a 雨 ☔"}),
        json!({"comment": long_comment}),
        json!({"a": {"b": {"c": {"d": {"e": [1, null, {"f": "g"}]}}}}}),
    ];
    for plain in cases {
        let envelope = seal(&plain, "hunter2").expect("seal");
        assert_eq!(open(&envelope, "hunter2").expect("open"), plain);
    }
}

#[test]
fn wrong_secret_is_a_decryption_failure() {
    let envelope = seal(&sample_payload(), "hunter2").expect("seal");
    match open(&envelope, "hunter3") {
        Err(CryptoError::DecryptionFailed) => {}
        other => panic!("expected DecryptionFailed, got {other:?}"),
    }
}

#[test]
fn tampered_ciphertext_fails_authentication() {
    let mut envelope = seal(&sample_payload(), "hunter2").expect("seal");
    let mut bytes = envelope.data.into_bytes();
    let last = bytes.len() - 1;
    bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
    envelope.data = String::from_utf8(bytes).expect("still ascii");

    match open(&envelope, "hunter2") {
        Err(CryptoError::DecryptionFailed) => {}
        other => panic!("expected DecryptionFailed, got {other:?}"),
    }
}

#[test]
fn unknown_version_is_rejected_before_any_decryption() {
    let mut envelope = seal(&sample_payload(), "hunter2").expect("seal");
    envelope.version = ENVELOPE_VERSION + 1;
    // Garbage data would otherwise fail differently; the version gate
    // must fire first.
    envelope.data = "not even base64!!!".to_string();

    match open(&envelope, "hunter2") {
        Err(CryptoError::UnsupportedVersion { found }) => {
            assert_eq!(found, ENVELOPE_VERSION + 1);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn token_hash_mismatch_does_not_block_a_valid_secret() {
    let mut envelope = seal(&sample_payload(), "hunter2").expect("seal");
    envelope.token_hash = "deadbeef".to_string();
    let opened = open(&envelope, "hunter2").expect("open despite stale hash");
    assert_eq!(opened, sample_payload());
}

#[test]
fn envelope_detection_matches_the_wire_shape() {
    let envelope = seal(&sample_payload(), "hunter2").expect("seal");
    let wire = serde_json::to_value(&envelope).expect("to_value");
    assert!(is_envelope(&wire));
    assert!(wire.get("tokenHash").is_some(), "camelCase field name");

    assert!(!is_envelope(&sample_payload()));
    assert!(!is_envelope(&json!({"encrypted": false, "version": 1, "data": "", "timestamp": ""})));
    assert!(!is_envelope(&json!({"encrypted": true, "version": 1, "data": ""})));
}

#[test]
fn truncated_blob_is_a_decryption_failure_not_a_panic() {
    let mut envelope = seal(&sample_payload(), "hunter2").expect("seal");
    // Shorter than salt + nonce once decoded.
    envelope.data = "AAAA".to_string();
    match open(&envelope, "hunter2") {
        Err(CryptoError::DecryptionFailed) => {}
        other => panic!("expected DecryptionFailed, got {other:?}"),
    }
}
