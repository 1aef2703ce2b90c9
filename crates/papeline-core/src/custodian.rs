//! Disk Custodian (C4): a background monitor that reclaims shard files once their
//! records are recorded as loaded (or permanently failed). Runs as a single
//! cooperatively-cancellable worker whose only shared input is the ledger directory.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::catalogue::ShardCatalogue;

/// Default polling cadence (source hard-codes `CHECK_INTERVAL_SEC = 900` in production).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(900);

/// Default free-space floor in bytes (source hard-codes `DISK_THRESHOLD_GB = 30`).
pub const DEFAULT_THRESHOLD_BYTES: u64 = 30 * 1024 * 1024 * 1024;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub deleted: usize,
    pub bytes_freed: u64,
}

/// One polling cycle: if free space on `volume` is below `threshold_bytes`, delete every
/// file in `shard_dir` whose basename is recorded done or failed in `catalogue`. Never
/// deletes a pending file, and never touches the database.
pub fn sweep_once(
    volume: &Path,
    shard_dir: &Path,
    catalogue: &ShardCatalogue,
    threshold_bytes: u64,
) -> std::io::Result<SweepReport> {
    let free = fs2::available_space(volume)?;
    if free >= threshold_bytes {
        return Ok(SweepReport::default());
    }

    log::warn!(
        "disk custodian: {} free on {} is below threshold {}, reclaiming loaded shards",
        free,
        volume.display(),
        threshold_bytes
    );

    let mut report = SweepReport::default();
    let entries = match std::fs::read_dir(shard_dir) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("disk custodian: could not list {}: {e}", shard_dir.display());
            return Ok(report);
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("disk custodian: transient error listing directory: {e}");
                continue;
            }
        };
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !(catalogue.is_done(name) || catalogue.is_failed(name)) {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                report.deleted += 1;
                report.bytes_freed += size;
            }
            Err(e) => log::warn!("disk custodian: failed to delete {}: {e}", path.display()),
        }
    }

    Ok(report)
}

/// Signal sent to stop the custodian's background loop.
pub struct CustodianHandle {
    stop_tx: mpsc::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CustodianHandle {
    /// Request shutdown and join the background thread.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

/// Spawn the custodian as a background thread polling every `poll_interval`. The caller
/// supplies a fresh `ShardCatalogue` reader per tick via `reopen_catalogue` since the
/// catalogue reflects ledger state the orchestrator is actively appending to.
pub fn spawn(
    volume: PathBuf,
    shard_dir: PathBuf,
    poll_interval: Duration,
    threshold_bytes: u64,
    reopen_catalogue: impl Fn() -> std::io::Result<ShardCatalogue> + Send + 'static,
) -> CustodianHandle {
    let (stop_tx, stop_rx) = mpsc::channel();

    let thread = std::thread::spawn(move || loop {
        match stop_rx.recv_timeout(poll_interval) {
            Ok(()) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let catalogue = match reopen_catalogue() {
            Ok(c) => c,
            Err(e) => {
                log::warn!("disk custodian: failed to reopen catalogue: {e}");
                continue;
            }
        };

        match sweep_once(&volume, &shard_dir, &catalogue, threshold_bytes) {
            Ok(report) if report.deleted > 0 => {
                log::info!(
                    "disk custodian: reclaimed {} shard(s), {} bytes",
                    report.deleted,
                    report.bytes_freed
                );
            }
            Ok(_) => {}
            Err(e) => log::warn!("disk custodian: sweep failed: {e}"),
        }
    });

    CustodianHandle {
        stop_tx,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn above_threshold_deletes_nothing() {
        let shard_dir = TempDir::new().unwrap();
        std::fs::write(shard_dir.path().join("a.gz"), b"x").unwrap();
        let logs = TempDir::new().unwrap();
        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "m0").unwrap();
        cat.mark_done("a.gz").unwrap();

        // Threshold of 0 bytes is always satisfied.
        let report = sweep_once(shard_dir.path(), shard_dir.path(), &cat, 0).unwrap();
        assert_eq!(report.deleted, 0);
        assert!(shard_dir.path().join("a.gz").exists());
    }

    #[test]
    fn below_threshold_deletes_done_and_failed_only() {
        let shard_dir = TempDir::new().unwrap();
        std::fs::write(shard_dir.path().join("done.gz"), b"x").unwrap();
        std::fs::write(shard_dir.path().join("failed.gz"), b"x").unwrap();
        std::fs::write(shard_dir.path().join("pending.gz"), b"x").unwrap();
        let logs = TempDir::new().unwrap();
        let mut cat = ShardCatalogue::open(logs.path(), "s2orc", "m0").unwrap();
        cat.mark_done("done.gz").unwrap();
        cat.mark_failed("failed.gz", "err").unwrap();

        // Threshold larger than any real free-space reading is always "below".
        let report = sweep_once(shard_dir.path(), shard_dir.path(), &cat, u64::MAX).unwrap();
        assert_eq!(report.deleted, 2);
        assert!(!shard_dir.path().join("done.gz").exists());
        assert!(!shard_dir.path().join("failed.gz").exists());
        assert!(shard_dir.path().join("pending.gz").exists());
    }

    #[test]
    fn spawn_and_stop_without_ticking() {
        let shard_dir = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let handle = spawn(
            shard_dir.path().to_path_buf(),
            shard_dir.path().to_path_buf(),
            Duration::from_secs(3600),
            DEFAULT_THRESHOLD_BYTES,
            move || ShardCatalogue::open(logs.path(), "s2orc", "m0"),
        );
        handle.stop();
    }
}
