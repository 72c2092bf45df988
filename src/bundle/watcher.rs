//! Source tree watcher for development rebuilds
//!
//! Polls the function source root and requests a rebuild whenever a file is
//! added, removed, or modified.
//!
//! A baseline taken before the initial build should be passed through
//! [`SourceWatcher::with_baseline`]; without one the watcher snapshots the
//! tree when it starts, and edits made between that build and the snapshot
//! go unnoticed.

use crate::bundle::pipeline::BuildTrigger;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

/// Snapshot of a directory tree: path → (mtime, size).
pub type Fingerprint = BTreeMap<PathBuf, (Option<SystemTime>, u64)>;

/// Polling watcher over the function source root
pub struct SourceWatcher {
    root: PathBuf,
    trigger: BuildTrigger,
    poll_interval: Duration,
    last: Option<Fingerprint>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SourceWatcher {
    pub fn new(root: PathBuf, trigger: BuildTrigger, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            root,
            trigger,
            poll_interval: Duration::from_millis(500),
            last: None,
            shutdown_rx,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Compare the first poll against `baseline` instead of a fresh snapshot.
    pub fn with_baseline(mut self, baseline: Fingerprint) -> Self {
        self.last = Some(baseline);
        self
    }

    /// Run the watcher loop
    pub async fn run(&mut self) {
        if self.last.is_none() {
            self.last = Some(self.snapshot().await);
        }
        tracing::info!(root = %self.root.display(), "Watching function sources");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.check_for_changes().await;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        tracing::info!("Source watcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn check_for_changes(&mut self) {
        let current = self.snapshot().await;
        if self.last.as_ref() == Some(&current) {
            return;
        }

        tracing::info!("Function sources changed, rebuilding...");
        self.last = Some(current);
        if !self.trigger.request() {
            tracing::debug!("Rebuild already queued");
        }
    }

    async fn snapshot(&self) -> Fingerprint {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || fingerprint(&root))
            .await
            .unwrap_or_default()
    }
}

/// Fingerprint every regular file under `root`. Symlinks are not followed.
pub fn fingerprint(root: &Path) -> Fingerprint {
    let mut out = Fingerprint::new();
    collect(root, &mut out);
    out
}

fn collect(dir: &Path, out: &mut Fingerprint) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect(&entry.path(), out);
        } else if file_type.is_file() {
            let meta = entry.metadata().ok();
            out.insert(
                entry.path(),
                (
                    meta.as_ref().and_then(|m| m.modified().ok()),
                    meta.map(|m| m.len()).unwrap_or(0),
                ),
            );
        }
    }
}
