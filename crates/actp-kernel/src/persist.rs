//! Durable substrate for ledger snapshots.
//!
//! A [`SnapshotSink`] receives every snapshot the store is about to publish.
//! The store only publishes after `persist` returns `Ok`, so observers never
//! see state the sink has not accepted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::store::Snapshot;

/// Destination for committed snapshots.
pub trait SnapshotSink: Send + Sync + fmt::Debug {
    /// Durably records `snapshot`. Called before the snapshot is published.
    fn persist(&self, snapshot: &Snapshot) -> Result<()>;

    /// Returns the last persisted snapshot, if any.
    fn load(&self) -> Result<Option<Snapshot>>;
}

impl<S: SnapshotSink + ?Sized> SnapshotSink for Arc<S> {
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).persist(snapshot)
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        (**self).load()
    }
}

/// A sink that keeps nothing. Used by purely in-memory simulations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl SnapshotSink for NoopSink {
    fn persist(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        Ok(None)
    }
}

/// Keeps the last persisted snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    last: Mutex<Option<Snapshot>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSink for MemorySink {
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        *self.last.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        Ok(self.last.lock().clone())
    }
}

/// Writes each snapshot as JSON, replacing the previous file atomically.
///
/// The new snapshot goes to a sibling temporary file first and is then
/// renamed over the target, so a crash leaves either the old or the new
/// snapshot on disk, never a torn one.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Creates a sink writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotSink for JsonFileSink {
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec(snapshot)
            .map_err(|e| LedgerError::Persistence(format!("failed to encode snapshot: {e}")))?;

        let temp = self.temp_path();
        std::fs::write(&temp, json).map_err(|e| {
            LedgerError::Persistence(format!("failed to write '{}': {e}", temp.display()))
        })?;
        std::fs::rename(&temp, &self.path).map_err(|e| {
            LedgerError::Persistence(format!(
                "failed to replace '{}': {e}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), sequence = snapshot.sequence, "persisted snapshot");
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read(&self.path).map_err(|e| {
            LedgerError::Persistence(format!("failed to read '{}': {e}", self.path.display()))
        })?;
        let snapshot = serde_json::from_slice(&content)
            .map_err(|e| LedgerError::Persistence(format!("corrupt snapshot: {e}")))?;

        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actp_core::{Address, Amount};

    #[test]
    fn noop_sink_loads_nothing() {
        let sink = NoopSink;
        sink.persist(&Snapshot::default()).unwrap();
        assert!(sink.load().unwrap().is_none());
    }

    #[test]
    fn memory_sink_returns_last_snapshot() {
        let sink = MemorySink::new();
        assert!(sink.load().unwrap().is_none());

        let mut snap = Snapshot::default();
        snap.credit(&Address::named("alice"), Amount::from_units(2)).unwrap();
        sink.persist(&snap).unwrap();

        assert_eq!(sink.load().unwrap(), Some(snap));
    }

    #[test]
    fn json_file_sink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("ledger.json"));
        assert!(sink.load().unwrap().is_none());

        let mut snap = Snapshot::default();
        snap.credit(&Address::named("bob"), Amount::from_cents(12, 34)).unwrap();
        sink.persist(&snap).unwrap();

        assert_eq!(sink.load().unwrap(), Some(snap));
        assert!(!dir.path().join("ledger.json.tmp").exists());
    }

    #[test]
    fn json_file_sink_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileSink::new(&path).load().unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
    }

    #[test]
    fn json_file_sink_fails_on_missing_directory() {
        let sink = JsonFileSink::new("/nonexistent-dir/ledger.json");
        let err = sink.persist(&Snapshot::default()).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
    }
}
