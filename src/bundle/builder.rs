//! Remote bundle builder
//!
//! Turns the function source tree into one staged build directory:
//!
//! ```text
//! <output>/builds/<build-id>/
//!   mf-manifest.json
//!   entries/<logical name>.<ext>
//! ```
//!
//! Every module is compiled and checked against the handler ABI before it is
//! copied, so a build either stages every function or fails as a whole. A
//! failed build removes its staging directory and leaves nothing behind.

use crate::bundle::manifest::{
    EntryFormat, LoadSpec, Manifest, ManifestEntry, BUILDS_DIR, ENTRIES_DIR, MANIFEST_FILE,
};
use crate::error::{BuildError, FederationError, Result};
use crate::federation::host::WasmHost;
use crate::functions::discovery::{discover_functions, DiscoveredFunction, Discovery};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A build that has been staged on disk but not yet published.
#[derive(Debug, Clone)]
pub struct StagedBuild {
    pub manifest: Manifest,
    /// `<output>/builds/<build-id>`
    pub dir: PathBuf,
}

/// Compiles the function source tree into a staged bundle.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    source_root: PathBuf,
    output_root: PathBuf,
    remote: String,
    host: WasmHost,
}

impl BundleBuilder {
    pub fn new(
        source_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        remote: impl Into<String>,
        host: WasmHost,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            remote: remote.into(),
            host,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Run one build. Blocking; the pipeline runs it on the blocking pool.
    pub fn build(&self) -> Result<StagedBuild> {
        let started = Instant::now();
        let discovery = match discover_functions(&self.source_root) {
            Ok(discovery) => discovery,
            Err(FederationError::Discovery(e)) if e.is_degradable() => {
                warn!(error = %e, "Function source root unavailable, publishing empty bundle");
                Discovery {
                    root: self.source_root.clone(),
                    ..Default::default()
                }
            }
            Err(FederationError::Discovery(e)) => return Err(BuildError::Discovery(e).into()),
            Err(e) => return Err(e),
        };

        let build_id = new_build_id();
        let dir = self.output_root.join(BUILDS_DIR).join(&build_id);

        match self.stage(&discovery, &build_id, &dir) {
            Ok(manifest) => {
                info!(
                    build_id = %build_id,
                    functions = manifest.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Staged server bundle"
                );
                Ok(StagedBuild { manifest, dir })
            }
            Err(e) => {
                if dir.exists() {
                    if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                        warn!(dir = %dir.display(), error = %cleanup, "Failed to remove staging directory");
                    }
                }
                Err(e)
            }
        }
    }

    fn stage(&self, discovery: &Discovery, build_id: &str, dir: &Path) -> Result<Manifest> {
        let entries_dir = dir.join(ENTRIES_DIR);
        std::fs::create_dir_all(&entries_dir)
            .map_err(|e| BuildError::output("create build directory", e.to_string()))?;

        let mut manifest = Manifest::new(&self.remote, build_id);
        for function in discovery.functions.values() {
            let entry = self.stage_function(function, build_id, &entries_dir)?;
            manifest.insert(entry);
        }

        let json = manifest.to_json()?;
        std::fs::write(dir.join(MANIFEST_FILE), json)
            .map_err(|e| BuildError::output("write build manifest", e.to_string()))?;

        Ok(manifest)
    }

    fn stage_function(
        &self,
        function: &DiscoveredFunction,
        build_id: &str,
        entries_dir: &Path,
    ) -> Result<ManifestEntry> {
        let format = EntryFormat::from_extension(&function.extension).ok_or_else(|| {
            BuildError::compile(
                &function.name,
                &function.path,
                format!("unsupported extension '{}'", function.extension),
            )
        })?;

        let source = std::fs::read(&function.path)
            .map_err(|e| BuildError::compile(&function.name, &function.path, e.to_string()))?;

        self.host.compile(&source).map_err(|e| {
            BuildError::compile(&function.name, &function.path, compile_detail(e))
        })?;

        let file_name = format!("{}.{}", function.name, format.extension());
        let target = entries_dir.join(&file_name);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BuildError::output("create entry directory", e.to_string()))?;
        }
        std::fs::write(&target, &source)
            .map_err(|e| BuildError::output("write entry", e.to_string()))?;

        debug!(function = %function.name, bytes = source.len(), "Staged entry");

        Ok(ManifestEntry {
            name: function.name.clone(),
            expose: function.expose_key(),
            load_spec: LoadSpec {
                path: format!("{}/{}/{}/{}", BUILDS_DIR, build_id, ENTRIES_DIR, file_name),
                sha256: sha256_hex(&source),
                size: source.len() as u64,
                format,
            },
        })
    }
}

fn compile_detail(error: FederationError) -> String {
    match error {
        FederationError::Wasm(detail) => detail,
        other => other.to_string(),
    }
}

/// Sortable build identifier: UTC timestamp plus a short random suffix.
pub fn new_build_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
        &suffix[..8]
    )
}

/// Hex-encoded SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
