#![forbid(unsafe_code)]

pub mod document;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod merge;
pub mod remote;
pub mod settings;
pub mod trigger;

mod timefmt;

pub use document::{DOCUMENT_VERSION, Document, export_document, import_replace};
pub use engine::{SyncEngine, SyncOutcome, SyncReport, SyncStatus};
pub use envelope::{Envelope, is_envelope, open, seal};
pub use error::{CryptoError, SyncError, SyncFailureKind, TransportError};
pub use merge::{MergeStats, merge_document};
pub use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteStore, TransportClient};
pub use settings::SyncSettings;
pub use trigger::{DebouncedTrigger, PeriodicTimer};
