//! Single-flight rebuild pipeline
//!
//! At most one build runs at a time. Triggers go through a capacity-1 queue:
//! a trigger that arrives while one is already queued is dropped, because the
//! queued build will read the latest state of the source tree anyway.
//!
//! Every finished build, successful or not, is announced on a `watch`
//! channel as a [`BuildReport`].

use crate::bundle::builder::BundleBuilder;
use crate::bundle::store::{write_metadata_file, BundleStore, PublishedBundle};
use crate::config::ExtensionMetadata;
use crate::error::{FederationError, Result};
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of one build attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// No build has finished yet.
    Pending,
    Published {
        build_id: String,
        functions: Vec<String>,
        duration_ms: u64,
    },
    Failed {
        error: String,
    },
}

/// Latest build result, tagged with a monotonically increasing generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub generation: u64,
    #[serde(flatten)]
    pub outcome: BuildOutcome,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Published { .. })
    }
}

/// Callback run after every successful publish.
pub type PublishHook = Arc<dyn Fn(&PublishedBundle) + Send + Sync>;

/// Coordinates builds and publishing.
pub struct BuildPipeline {
    builder: Arc<BundleBuilder>,
    store: Arc<BundleStore>,
    metadata: ExtensionMetadata,
    client_dir: Option<PathBuf>,
    build_lock: Mutex<u64>,
    reports: watch::Sender<BuildReport>,
    hooks: SyncMutex<Vec<PublishHook>>,
}

impl BuildPipeline {
    pub fn new(
        builder: BundleBuilder,
        store: Arc<BundleStore>,
        metadata: ExtensionMetadata,
    ) -> Self {
        let (reports, _) = watch::channel(BuildReport {
            generation: 0,
            outcome: BuildOutcome::Pending,
        });
        Self {
            builder: Arc::new(builder),
            store,
            metadata,
            client_dir: None,
            build_lock: Mutex::new(0),
            reports,
            hooks: SyncMutex::new(Vec::new()),
        }
    }

    /// Also write the metadata file into the client output directory.
    pub fn with_client_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.client_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }

    /// Register a callback run after every successful publish.
    pub fn on_publish(&self, hook: PublishHook) {
        self.hooks.lock().push(hook);
    }

    /// Subscribe to build reports.
    pub fn subscribe(&self) -> watch::Receiver<BuildReport> {
        self.reports.subscribe()
    }

    /// Latest build report.
    pub fn last_report(&self) -> BuildReport {
        self.reports.borrow().clone()
    }

    /// Build and publish now, waiting for any in-flight build first.
    pub async fn rebuild_now(&self) -> BuildReport {
        let mut generation = self.build_lock.lock().await;
        *generation += 1;
        let started = Instant::now();

        let outcome = match self.build_and_publish().await {
            Ok(bundle) => BuildOutcome::Published {
                build_id: bundle.build_id().to_string(),
                functions: bundle.manifest.names().map(str::to_string).collect(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => {
                error!(error = %e, "Rebuild failed, previous bundle stays current");
                BuildOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let report = BuildReport {
            generation: *generation,
            outcome,
        };
        self.reports.send_replace(report.clone());
        report
    }

    async fn build_and_publish(&self) -> Result<Arc<PublishedBundle>> {
        let builder = self.builder.clone();
        let staged = tokio::task::spawn_blocking(move || builder.build())
            .await
            .map_err(|e| FederationError::server_task_failed("bundle build", e.to_string()))??;

        let bundle = self.store.publish(staged)?;

        // Bundle is live; metadata is best-effort.
        if let Err(e) = self.store.write_metadata(&self.metadata) {
            warn!(error = %e, "Failed to write extension metadata");
        }
        if let Some(client_dir) = self.client_dir.as_ref().filter(|d| d.is_dir()) {
            if let Err(e) = write_metadata_file(client_dir, &self.metadata) {
                warn!(error = %e, dir = %client_dir.display(), "Failed to write client metadata");
            }
        }

        let hooks = self.hooks.lock().clone();
        for hook in hooks {
            hook(&bundle);
        }

        Ok(bundle)
    }

    /// Spawn the rebuild worker and return a trigger handle for it.
    ///
    /// The worker exits when every [`BuildTrigger`] is dropped or `shutdown_rx`
    /// flips to `true`.
    pub fn spawn_worker(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> (BuildTrigger, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let pipeline = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    trigger = rx.recv() => {
                        if trigger.is_none() {
                            break;
                        }
                        let report = pipeline.rebuild_now().await;
                        debug!(generation = report.generation, success = report.is_success(), "Rebuild finished");
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Rebuild worker stopped");
        });

        (BuildTrigger { tx }, handle)
    }
}

/// Handle used to request a rebuild.
#[derive(Debug, Clone)]
pub struct BuildTrigger {
    tx: mpsc::Sender<()>,
}

impl BuildTrigger {
    /// Wrap an existing queue; the receiver side decides what a trigger means.
    pub fn from_sender(tx: mpsc::Sender<()>) -> Self {
        Self { tx }
    }

    /// Queue a rebuild. Returns `false` when one was already queued.
    pub fn request(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Wait until a report with `generation > after` is published.
pub async fn wait_for_build(
    rx: &mut watch::Receiver<BuildReport>,
    after: u64,
    timeout: Duration,
) -> Option<BuildReport> {
    let wait = rx.wait_for(|report| report.generation > after);
    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(report)) => Some(report.clone()),
        _ => None,
    }
}
