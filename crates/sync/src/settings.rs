#![forbid(unsafe_code)]

/// Read-only configuration surface for the sync core, owned by the caller's
/// settings layer. The remote credentials themselves (access token, resource
/// URL) go straight into the transport implementation.
#[derive(Clone, Debug, Default)]
pub struct SyncSettings {
    /// Wrap documents in the encryption envelope before upload.
    pub encryption_enabled: bool,
    /// Secret used both to reach the remote store and to derive the
    /// envelope key. Required when `encryption_enabled` is set.
    pub secret: Option<String>,
}

impl SyncSettings {
    pub fn plaintext() -> Self {
        Self::default()
    }

    pub fn encrypted(secret: impl Into<String>) -> Self {
        Self {
            encryption_enabled: true,
            secret: Some(secret.into()),
        }
    }
}
