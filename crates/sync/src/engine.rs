#![forbid(unsafe_code)]

use crate::document::{self, Document};
use crate::error::{SyncError, SyncFailureKind};
use crate::merge;
use crate::remote::{RemoteStore, TransportClient};
use crate::settings::SyncSettings;
use crate::timefmt::now_ms;
use tally_storage::SqliteStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Checking,
    Downloading,
    Uploading,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    SkippedInFlight,
    SkippedGated,
    Failed,
}

#[derive(Debug)]
pub struct SyncFailure {
    pub kind: SyncFailureKind,
    pub message: String,
}

#[derive(Debug)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// First-ever successful sync on this device; callers use this to
    /// decide whether a full UI refresh is warranted.
    pub first_sync: bool,
    /// The merge mutated local state. Can be true even on a failed round
    /// (upload-only failure: the merge already landed locally).
    pub local_changed: bool,
    pub failure: Option<SyncFailure>,
}

impl SyncReport {
    fn skipped(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            first_sync: false,
            local_changed: false,
            failure: None,
        }
    }
}

/// Drives one complete sync round: export → download → merge → re-export →
/// upload. Fail-fast, no retries; retry policy belongs to the caller.
pub struct SyncEngine<R: RemoteStore> {
    store: SqliteStore,
    client: TransportClient<R>,
    network_gate: Option<Box<dyn Fn() -> bool>>,
    status: SyncStatus,
    in_flight: bool,
}

impl<R: RemoteStore> SyncEngine<R> {
    pub fn new(store: SqliteStore, remote: R, settings: SyncSettings) -> Self {
        Self {
            store,
            client: TransportClient::new(remote, settings),
            network_gate: None,
            status: SyncStatus::Idle,
            in_flight: false,
        }
    }

    /// Pure predicate evaluated just before a round starts (e.g. "not on a
    /// metered network"). Not a throttle.
    pub fn with_network_gate(mut self, gate: impl Fn() -> bool + 'static) -> Self {
        self.network_gate = Some(Box::new(gate));
        self
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SqliteStore {
        &mut self.store
    }

    /// One sync round. Single-flight: a round already in progress on this
    /// device makes this call a no-op report, and the guard is cleared on
    /// every exit path.
    pub fn perform_sync(&mut self) -> SyncReport {
        if self.in_flight {
            log::debug!("sync already in flight; skipping");
            return SyncReport::skipped(SyncOutcome::SkippedInFlight);
        }
        if let Some(gate) = &self.network_gate
            && !gate()
        {
            log::debug!("network gate closed; skipping sync round");
            return SyncReport::skipped(SyncOutcome::SkippedGated);
        }

        self.in_flight = true;
        self.status = SyncStatus::Checking;
        let report = match self.run_round() {
            Ok(report) => report,
            Err(err) => {
                log::warn!("sync round failed: {err}");
                SyncReport {
                    outcome: SyncOutcome::Failed,
                    first_sync: false,
                    local_changed: false,
                    failure: Some(SyncFailure {
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                }
            }
        };
        self.status = SyncStatus::Idle;
        self.in_flight = false;
        report
    }

    fn run_round(&mut self) -> Result<SyncReport, SyncError> {
        let first_sync = !self.store.synced_once()?;
        let local = document::export_document(&self.store)?;

        let Some(raw_remote) = self.client.fetch() else {
            // First-sync-ever (or unreachable remote): publish local as-is,
            // nothing to merge.
            self.status = SyncStatus::Uploading;
            self.client.publish(&local)?;
            return self.finish_success(first_sync, false);
        };

        // A present-but-malformed remote aborts before any local mutation.
        let remote = Document::from_value(raw_remote)?;

        self.status = SyncStatus::Downloading;
        let stats = merge::merge_document(&mut self.store, &remote)?;
        let local_changed = stats.changed();
        let merged = document::export_document(&self.store)?;

        self.status = SyncStatus::Uploading;
        if let Err(err) = self.client.publish(&merged) {
            // The merge already landed locally; report that even though the
            // round as a whole failed on the upload leg.
            log::warn!("publish failed after merge: {err}");
            return Ok(SyncReport {
                outcome: SyncOutcome::Failed,
                first_sync: false,
                local_changed,
                failure: Some(SyncFailure {
                    kind: err.kind(),
                    message: err.to_string(),
                }),
            });
        }

        self.finish_success(first_sync, local_changed)
    }

    fn finish_success(
        &mut self,
        first_sync: bool,
        local_changed: bool,
    ) -> Result<SyncReport, SyncError> {
        self.store.set_last_sync_ms(now_ms())?;
        self.store.mark_synced_once()?;
        Ok(SyncReport {
            outcome: SyncOutcome::Success,
            first_sync,
            local_changed,
            failure: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use std::path::PathBuf;

    fn temp_dir(test_name: &str) -> PathBuf {
        let base = std::env::temp_dir();
        let pid = std::process::id();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = base.join(format!("tally_engine_{test_name}_{pid}_{nonce}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn in_flight_guard_refuses_a_second_round() {
        let store = SqliteStore::open(temp_dir("in_flight")).expect("open store");
        let mut engine =
            SyncEngine::new(store, MemoryRemoteStore::new(), SyncSettings::plaintext());

        engine.in_flight = true;
        let report = engine.perform_sync();
        assert_eq!(report.outcome, SyncOutcome::SkippedInFlight);

        engine.in_flight = false;
        let report = engine.perform_sync();
        assert_eq!(report.outcome, SyncOutcome::Success);
    }

    #[test]
    fn closed_network_gate_skips_the_round() {
        let store = SqliteStore::open(temp_dir("gate")).expect("open store");
        let remote = MemoryRemoteStore::new();
        let mut engine = SyncEngine::new(store, remote.clone(), SyncSettings::plaintext())
            .with_network_gate(|| false);

        let report = engine.perform_sync();
        assert_eq!(report.outcome, SyncOutcome::SkippedGated);
        assert!(remote.stored().is_none(), "nothing published through a closed gate");
    }
}
