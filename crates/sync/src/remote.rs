#![forbid(unsafe_code)]

use crate::document::Document;
use crate::envelope::{self, Envelope};
use crate::error::{CryptoError, SyncError, TransportError};
use crate::settings::SyncSettings;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Logical get/put against one named resource in the remote JSON-document
/// store. `get` returns `Ok(None)` when the resource does not exist yet.
pub trait RemoteStore {
    fn get(&self) -> Result<Option<serde_json::Value>, TransportError>;
    fn put(&self, value: &serde_json::Value) -> Result<(), TransportError>;
}

/// HTTP implementation over a bearer-token document store. One fixed
/// resource URL per installation; timeouts live on the underlying client.
pub struct HttpRemoteStore {
    client: reqwest::blocking::Client,
    resource_url: String,
    access_token: String,
}

impl HttpRemoteStore {
    pub fn new(
        resource_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            client,
            resource_url: resource_url.into(),
            access_token: access_token.into(),
        })
    }
}

impl RemoteStore for HttpRemoteStore {
    fn get(&self) -> Result<Option<serde_json::Value>, TransportError> {
        let response = self
            .client
            .get(&self.resource_url)
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let value = response
            .json::<serde_json::Value>()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Some(value))
    }

    fn put(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        let response = self
            .client
            .put(&self.resource_url)
            .bearer_auth(&self.access_token)
            .json(value)
            .send()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// In-memory remote used when syncing against a shared slot in-process
/// (tests, previews). Cloning shares the same slot, which is exactly what a
/// multi-device test wants.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    slot: Arc<Mutex<Option<serde_json::Value>>>,
    fail_get: Arc<Mutex<bool>>,
    fail_put: Arc<Mutex<bool>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Option<serde_json::Value> {
        self.slot.lock().expect("remote slot lock").clone()
    }

    pub fn set_stored(&self, value: Option<serde_json::Value>) {
        *self.slot.lock().expect("remote slot lock") = value;
    }

    pub fn fail_gets(&self, fail: bool) {
        *self.fail_get.lock().expect("remote flag lock") = fail;
    }

    pub fn fail_puts(&self, fail: bool) {
        *self.fail_put.lock().expect("remote flag lock") = fail;
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn get(&self) -> Result<Option<serde_json::Value>, TransportError> {
        if *self.fail_get.lock().expect("remote flag lock") {
            return Err(TransportError::Network("simulated fetch failure".to_string()));
        }
        Ok(self.slot.lock().expect("remote slot lock").clone())
    }

    fn put(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        if *self.fail_put.lock().expect("remote flag lock") {
            return Err(TransportError::Network("simulated publish failure".to_string()));
        }
        *self.slot.lock().expect("remote slot lock") = Some(value.clone());
        Ok(())
    }
}

/// Wraps a `RemoteStore` with envelope detection on read and envelope
/// application on write.
pub struct TransportClient<R: RemoteStore> {
    remote: R,
    settings: SyncSettings,
}

impl<R: RemoteStore> TransportClient<R> {
    pub fn new(remote: R, settings: SyncSettings) -> Self {
        Self { remote, settings }
    }

    /// Fetches the remote payload. Absence and transport failure both yield
    /// `None` ("nothing to merge yet"); so does a payload we cannot
    /// decrypt, with a diagnostic distinguishing the wrong-secret case from
    /// encryption being disabled locally while the remote is encrypted.
    pub fn fetch(&self) -> Option<serde_json::Value> {
        let raw = match self.remote.get() {
            Ok(Some(value)) => value,
            Ok(None) => {
                log::debug!("remote resource absent; treating as first sync");
                return None;
            }
            Err(err) => {
                log::warn!("remote fetch failed ({err}); treating as empty remote");
                return None;
            }
        };

        if !envelope::is_envelope(&raw) {
            return Some(raw);
        }

        let envelope: Envelope = match serde_json::from_value(raw) {
            Ok(env) => env,
            Err(err) => {
                log::warn!("remote payload looks encrypted but is malformed: {err}");
                return None;
            }
        };
        let Some(secret) = self.settings.secret.as_deref() else {
            log::warn!("remote document is encrypted but encryption is disabled locally");
            return None;
        };
        match envelope::open(&envelope, secret) {
            Ok(plain) => Some(plain),
            Err(CryptoError::DecryptionFailed) => {
                log::warn!("remote envelope failed to decrypt: wrong secret or corrupted data");
                None
            }
            Err(err) => {
                log::warn!("remote envelope rejected: {err}");
                None
            }
        }
    }

    /// Publishes a document, sealing it first when encryption is enabled.
    /// A seal failure is a hard error: data must never be uploaded
    /// unencrypted when encryption was requested. No retries.
    pub fn publish(&self, document: &Document) -> Result<(), SyncError> {
        let value = serde_json::to_value(document)?;
        let payload = if self.settings.encryption_enabled {
            let secret = self.settings.secret.as_deref().ok_or(SyncError::MissingSecret)?;
            let sealed = envelope::seal(&value, secret)?;
            serde_json::to_value(&sealed)?
        } else {
            value
        };
        self.remote.put(&payload)?;
        Ok(())
    }
}
