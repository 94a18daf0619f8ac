//! Background sweep of the scratch upload directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default minimum age of a file before it may be deleted.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(600);

/// Result of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub removed: usize,
    /// Files younger than the grace period.
    pub kept: usize,
    pub failed: usize,
}

/// Periodically deletes stale regular files from a scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchSweeper {
    dir: PathBuf,
    interval: Duration,
    grace: Duration,
}

impl ScratchSweeper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            interval: DEFAULT_SWEEP_INTERVAL,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run one sweep now.
    ///
    /// A missing directory is not an error. Subdirectories and symlinks are
    /// left alone.
    pub async fn sweep_once(&self) -> crate::Result<SweepStats> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    dir = %self.dir.display(),
                    "Scratch directory does not exist, nothing to sweep"
                );
                return Ok(SweepStats::default());
            }
            Err(e) => return Err(crate::Error::io_path("reading scratch directory", &self.dir, e)),
        };

        let now = SystemTime::now();
        let mut stats = SweepStats::default();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| crate::Error::io_path("reading scratch directory", &self.dir, e))?
        {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat scratch file");
                    stats.failed += 1;
                    continue;
                }
            };
            if !metadata.file_type().is_file() {
                continue;
            }

            // Files with an unreadable or future mtime count as fresh.
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.grace {
                stats.kept += 1;
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    stats.removed += 1;
                    debug!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "Deleted scratch file"
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    stats.failed += 1;
                    warn!(path = %path.display(), error = %e, "Failed to delete scratch file");
                }
            }
        }

        if stats.removed > 0 || stats.failed > 0 {
            info!(
                dir = %self.dir.display(),
                removed = stats.removed,
                kept = stats.kept,
                failed = stats.failed,
                "Scratch sweep finished"
            );
        }

        Ok(stats)
    }

    /// Sweep every `interval` until `cancel_token` fires.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                dir = %self.dir.display(),
                interval_secs = self.interval.as_secs(),
                grace_secs = self.grace.as_secs(),
                "Scratch sweeper started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Scratch sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "Scratch sweep failed");
                        }
                    }
                }
            }
        })
    }
}
