#![forbid(unsafe_code)]

use crate::error::CryptoError;
use crate::timefmt::{now_ms, ts_ms_to_rfc3339};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ENVELOPE_VERSION: u64 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ROUNDS: u32 = 150_000;

/// Authenticated-encryption wrapper around a serialized document.
/// `token_hash` is a non-secret fingerprint of the credential, kept purely
/// as a diagnostic hint; the secret itself is the sole authority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub encrypted: bool,
    pub version: u64,
    /// base64(salt ‖ nonce ‖ ciphertext‖tag)
    pub data: String,
    pub timestamp: String,
    #[serde(rename = "tokenHash")]
    pub token_hash: String,
}

fn derive_key(secret: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Encrypts `plain` under a key derived from `secret`. Salt and nonce are
/// fresh per call, so sealing identical content twice yields different
/// ciphertext.
pub fn seal(plain: &serde_json::Value, secret: &str) -> Result<Envelope, CryptoError> {
    let plaintext = serde_json::to_string(plain).map_err(CryptoError::Serialize)?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(secret, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|err| CryptoError::Cipher(format!("key init failed: {err}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|err| CryptoError::Cipher(format!("encrypt failed: {err}")))?;

    let mut blob = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(Envelope {
        encrypted: true,
        version: ENVELOPE_VERSION,
        data: STANDARD.encode(blob),
        timestamp: ts_ms_to_rfc3339(now_ms()),
        token_hash: sha256_hex(secret),
    })
}

/// Decrypts and authenticates an envelope. The version gate runs first and
/// fails regardless of `token_hash`; a token-hash mismatch is only ever a
/// logged warning since the secret alone decides whether decryption works.
pub fn open(envelope: &Envelope, secret: &str) -> Result<serde_json::Value, CryptoError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(CryptoError::UnsupportedVersion {
            found: envelope.version,
        });
    }
    if envelope.token_hash != sha256_hex(secret) {
        log::warn!("envelope token hash does not match the configured secret");
    }

    let blob = STANDARD
        .decode(&envelope.data)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    if blob.len() < SALT_LEN + NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (salt, rest) = blob.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(secret, salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|err| CryptoError::Cipher(format!("key init failed: {err}")))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let text = String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)?;
    serde_json::from_str(&text).map_err(|_| CryptoError::DecryptionFailed)
}

/// Permissive shape check used by the transport client to decide whether a
/// downloaded payload needs decrypting before it can be merged.
pub fn is_envelope(candidate: &serde_json::Value) -> bool {
    candidate.get("encrypted") == Some(&serde_json::Value::Bool(true))
        && candidate.get("version").is_some()
        && candidate.get("data").is_some()
        && candidate.get("timestamp").is_some()
}
