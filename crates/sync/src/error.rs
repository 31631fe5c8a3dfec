#![forbid(unsafe_code)]

use tally_storage::StoreError;

#[derive(Debug)]
pub enum CryptoError {
    UnsupportedVersion { found: u64 },
    DecryptionFailed,
    Cipher(String),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported envelope version {found}")
            }
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::Cipher(message) => write!(f, "cipher: {message}"),
            Self::Serialize(err) => write!(f, "serialize: {err}"),
        }
    }
}

impl std::error::Error for CryptoError {}

#[derive(Debug)]
pub enum TransportError {
    Network(String),
    Status(u16),
}

impl TransportError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Status(401 | 403))
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(message) => write!(f, "network: {message}"),
            Self::Status(code) => write!(f, "unexpected status {code}"),
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug)]
pub enum SyncError {
    Store(StoreError),
    Transport(TransportError),
    Crypto(CryptoError),
    InvalidRemoteFormat(&'static str),
    MissingSecret,
    Serialize(serde_json::Error),
}

/// User-facing classification of a failed round. The typed error carries
/// the cause; this collapses it to the handful of phrases the UI knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncFailureKind {
    Credential,
    Decryption,
    Format,
    Transport,
    Generic,
}

impl SyncError {
    pub fn kind(&self) -> SyncFailureKind {
        match self {
            Self::MissingSecret => SyncFailureKind::Credential,
            Self::Crypto(CryptoError::UnsupportedVersion { .. }) => SyncFailureKind::Format,
            Self::Crypto(_) => SyncFailureKind::Decryption,
            Self::InvalidRemoteFormat(_) => SyncFailureKind::Format,
            Self::Transport(err) if err.is_auth() => SyncFailureKind::Credential,
            Self::Transport(_) => SyncFailureKind::Transport,
            Self::Store(_) | Self::Serialize(_) => SyncFailureKind::Generic,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "store: {err}"),
            Self::Transport(err) => write!(f, "transport: {err}"),
            Self::Crypto(err) => write!(f, "crypto: {err}"),
            Self::InvalidRemoteFormat(message) => {
                write!(f, "invalid remote format: {message}")
            }
            Self::MissingSecret => write!(f, "encryption enabled but no secret configured"),
            Self::Serialize(err) => write!(f, "serialize: {err}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<TransportError> for SyncError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<CryptoError> for SyncError {
    fn from(value: CryptoError) -> Self {
        Self::Crypto(value)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}
