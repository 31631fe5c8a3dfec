#![forbid(unsafe_code)]

mod store;

pub use store::{NewEntry, NewTracker, SqliteStore, StoreError, now_ms};
