//! Current-bundle store
//!
//! Holds the one authoritative published bundle behind an atomic pointer.
//! Readers take a snapshot with [`BundleStore::current`] and keep using it for
//! the rest of their request; a concurrent publish never changes what an
//! in-flight reader sees.
//!
//! Publishing rename-replaces `<root>/mf-manifest.json` first and swaps the
//! in-memory pointer last, so an error from [`BundleStore::publish`] means the
//! previous bundle is still current. Build directories beyond the retention
//! window are pruned afterwards.

use crate::bundle::builder::StagedBuild;
use crate::bundle::manifest::{LoadSpec, Manifest, BUILDS_DIR, MANIFEST_FILE};
use crate::config::ExtensionMetadata;
use crate::error::{BuildError, FederationError, Result};
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extension metadata snapshot written next to the manifest.
pub const METADATA_FILE: &str = "pulse.config.json";

/// A published bundle snapshot.
#[derive(Debug)]
pub struct PublishedBundle {
    pub manifest: Manifest,
    /// Serialized manifest, served verbatim over HTTP.
    pub manifest_json: Bytes,
}

impl PublishedBundle {
    pub fn build_id(&self) -> &str {
        &self.manifest.build_id
    }
}

/// Owner of `<dist>/server` and the current-bundle pointer.
#[derive(Debug)]
pub struct BundleStore {
    root: PathBuf,
    retain_builds: usize,
    current: ArcSwapOption<PublishedBundle>,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>, retain_builds: usize) -> Self {
        Self {
            root: root.into(),
            retain_builds: retain_builds.max(1),
            current: ArcSwapOption::empty(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of the current bundle, if any has been published.
    pub fn current(&self) -> Option<Arc<PublishedBundle>> {
        self.current.load_full()
    }

    /// Pick up a manifest left on disk by an earlier run.
    ///
    /// Returns `Ok(None)` when there is nothing to restore.
    pub fn restore(&self) -> Result<Option<Arc<PublishedBundle>>> {
        let path = self.root.join(MANIFEST_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = Manifest::from_json(&bytes)?;
        info!(build_id = %manifest.build_id, "Restored published bundle from disk");

        let bundle = Arc::new(PublishedBundle {
            manifest,
            manifest_json: Bytes::from(bytes),
        });
        self.current.store(Some(bundle.clone()));
        Ok(Some(bundle))
    }

    /// Make a staged build the current bundle.
    pub fn publish(&self, staged: StagedBuild) -> Result<Arc<PublishedBundle>> {
        let manifest_json = Bytes::from(staged.manifest.to_json()?);
        let bundle = Arc::new(PublishedBundle {
            manifest: staged.manifest,
            manifest_json,
        });

        self.write_manifest(&bundle.manifest_json)?;
        let previous = self.current.swap(Some(bundle.clone()));

        info!(
            build_id = %bundle.build_id(),
            previous = previous.as_ref().map(|b| b.build_id()).unwrap_or("none"),
            functions = bundle.manifest.len(),
            "Published server bundle"
        );

        if let Err(e) = self.prune(bundle.build_id()) {
            warn!(error = %e, "Failed to prune old builds");
        }

        Ok(bundle)
    }

    /// Write the extension metadata file.
    pub fn write_metadata(&self, metadata: &ExtensionMetadata) -> Result<()> {
        write_metadata_file(&self.root, metadata)
    }

    /// Read the payload of one entry from disk.
    pub async fn read_entry(&self, spec: &LoadSpec) -> Result<Bytes> {
        let path = self.resolve_path(&spec.path).ok_or_else(|| {
            FederationError::remote("read entry", format!("invalid entry path '{}'", spec.path))
        })?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| FederationError::remote("read entry", format!("{}: {}", spec.path, e)))
    }

    /// Join a bundle-relative path onto the root, rejecting traversal.
    pub fn resolve_path(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn write_manifest(&self, json: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| BuildError::output("create bundle root", e.to_string()))?;

        let target = self.root.join(MANIFEST_FILE);
        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", MANIFEST_FILE, std::process::id()));
        std::fs::write(&tmp, json)
            .map_err(|e| BuildError::output("write manifest", e.to_string()))?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(BuildError::output("replace manifest", e.to_string()).into());
        }
        Ok(())
    }

    /// Remove build directories beyond the retention window.
    ///
    /// The directory of `keep` is never removed.
    pub fn prune(&self, keep: &str) -> Result<usize> {
        let builds = self.root.join(BUILDS_DIR);
        let entries = match std::fs::read_dir(&builds) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        // Build ids start with a UTC timestamp; newest first.
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut removed = 0;
        for id in ids.into_iter().skip(self.retain_builds) {
            if id == keep {
                continue;
            }
            match std::fs::remove_dir_all(builds.join(&id)) {
                Ok(()) => {
                    debug!(build_id = %id, "Pruned build");
                    removed += 1;
                }
                Err(e) => warn!(build_id = %id, error = %e, "Failed to prune build"),
            }
        }
        Ok(removed)
    }
}

/// Write `pulse.config.json` into `dir`.
pub fn write_metadata_file(dir: &Path, metadata: &ExtensionMetadata) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_vec_pretty(metadata)?;
    std::fs::write(dir.join(METADATA_FILE), json)?;
    Ok(())
}
