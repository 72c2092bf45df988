//! Runtime instance
//!
//! Resolves lookup keys (`<remote>/<logical name>`) against the manifests of
//! its registered remotes, loads and compiles the matching entries, and runs
//! them on the wasm host. A manifest is fetched at most once per instance;
//! compiled modules are cached by content hash.

use crate::bundle::builder::sha256_hex;
use crate::bundle::manifest::{Manifest, ManifestEntry};
use crate::error::{FederationError, Result};
use crate::federation::host::WasmHost;
use crate::federation::remote::RemoteSource;
use crate::functions::discovery::split_lookup_key;
use crate::functions::protocol::{HandlerOutput, NormalizedRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use wasmtime::Module;

struct RegisteredRemote {
    source: Arc<dyn RemoteSource>,
    manifest: OnceCell<Arc<Manifest>>,
}

/// Container that can resolve and load entries from remote manifests.
pub struct RuntimeInstance {
    host: WasmHost,
    remotes: HashMap<String, RegisteredRemote>,
    modules: Mutex<HashMap<String, Module>>,
}

impl RuntimeInstance {
    pub fn new(host: WasmHost, remotes: &[Arc<dyn RemoteSource>]) -> Self {
        let remotes = remotes
            .iter()
            .map(|source| {
                (
                    source.name().to_string(),
                    RegisteredRemote {
                        source: source.clone(),
                        manifest: OnceCell::new(),
                    },
                )
            })
            .collect();
        Self {
            host,
            remotes,
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn remote_names(&self) -> impl Iterator<Item = &str> {
        self.remotes.keys().map(String::as_str)
    }

    /// Manifest of `remote`, fetched on first use.
    pub async fn manifest(&self, remote: &str) -> Result<Arc<Manifest>> {
        let registered = self
            .remotes
            .get(remote)
            .ok_or_else(|| FederationError::unresolved(remote, ""))?;
        registered
            .manifest
            .get_or_try_init(|| async {
                let manifest = registered.source.fetch_manifest().await?;
                debug!(remote = %remote, build_id = %manifest.build_id, "Loaded remote manifest");
                Ok::<_, FederationError>(Arc::new(manifest))
            })
            .await
            .cloned()
    }

    /// Resolve a lookup key to its manifest entry.
    pub async fn resolve(&self, key: &str) -> Result<(Arc<dyn RemoteSource>, ManifestEntry)> {
        let (remote, name) =
            split_lookup_key(key).ok_or_else(|| FederationError::unresolved(key, ""))?;
        let registered = self
            .remotes
            .get(remote)
            .ok_or_else(|| FederationError::unresolved(remote, name))?;

        let manifest = self.manifest(remote).await?;
        let entry = manifest
            .resolve(name)
            .cloned()
            .ok_or_else(|| FederationError::unresolved(remote, name))?;
        Ok((registered.source.clone(), entry))
    }

    /// Load (fetch, verify, compile) the module behind a lookup key.
    pub async fn load(&self, key: &str) -> Result<Module> {
        let (source, entry) = self.resolve(key).await?;
        let spec = &entry.load_spec;

        if let Some(module) = self.modules.lock().get(&spec.sha256) {
            return Ok(module.clone());
        }

        let payload = source.fetch_entry(spec).await?;
        let digest = sha256_hex(&payload);
        if digest != spec.sha256 {
            return Err(FederationError::remote(
                "verify entry",
                format!("{} hash mismatch", spec.path),
            ));
        }

        let host = self.host.clone();
        let module = tokio::task::spawn_blocking(move || host.compile(&payload))
            .await
            .map_err(|e| FederationError::server_task_failed("compile entry", e.to_string()))?
            .map_err(|e| FederationError::invocation(&entry.name, e.to_string()))?;

        self.modules
            .lock()
            .insert(spec.sha256.clone(), module.clone());
        Ok(module)
    }

    /// Resolve, load, and run the handler behind a lookup key.
    pub async fn invoke(&self, key: &str, request: NormalizedRequest) -> Result<HandlerOutput> {
        let module = self.load(key).await?;
        let name = split_lookup_key(key)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| key.to_string());

        let host = self.host.clone();
        tokio::task::spawn_blocking(move || host.invoke(&name, &module, &request))
            .await
            .map_err(|e| FederationError::server_task_failed("invoke handler", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::builder::BundleBuilder;
    use crate::bundle::store::BundleStore;
    use crate::federation::host::HostLimits;
    use crate::federation::remote::StoreRemote;
    use std::fs;
    use tempfile::TempDir;

    const ECHO: &str = include_str!("../../functions/echo.wat");

    async fn published(src: &TempDir, out: &TempDir) -> (WasmHost, Arc<BundleStore>) {
        let host = WasmHost::new(HostLimits::default()).unwrap();
        let store = Arc::new(BundleStore::new(out.path(), 3));
        let staged = BundleBuilder::new(src.path(), out.path(), "wheel_server", host.clone())
            .build()
            .unwrap();
        store.publish(staged).unwrap();
        (host, store)
    }

    #[tokio::test]
    async fn test_invoke_through_store_remote() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(src.path().join("echo.wat"), ECHO).unwrap();
        let (host, store) = published(&src, &out).await;

        let remote: Arc<dyn RemoteSource> = Arc::new(StoreRemote::new("wheel_server", store));
        let instance = RuntimeInstance::new(host, &[remote]);

        let output = instance
            .invoke("wheel_server/echo", NormalizedRequest::post("http://x/", "hi"))
            .await
            .unwrap();
        match output {
            HandlerOutput::Response(resp) => assert_eq!(&resp.body[..], b"hi"),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_name_and_remote_are_unresolved() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(src.path().join("echo.wat"), ECHO).unwrap();
        let (host, store) = published(&src, &out).await;

        let remote: Arc<dyn RemoteSource> = Arc::new(StoreRemote::new("wheel_server", store));
        let instance = RuntimeInstance::new(host, &[remote]);

        let err = instance.load("wheel_server/missing").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = instance.load("other_server/echo").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = instance.load("nokey").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_manifest_fetched_once_per_instance() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(src.path().join("echo.wat"), ECHO).unwrap();
        let (host, store) = published(&src, &out).await;

        let remote: Arc<dyn RemoteSource> =
            Arc::new(StoreRemote::new("wheel_server", store.clone()));
        let instance = RuntimeInstance::new(host.clone(), &[remote]);
        let first = instance.manifest("wheel_server").await.unwrap();

        // Publish an empty bundle; this instance keeps its snapshot.
        fs::remove_file(src.path().join("echo.wat")).unwrap();
        let staged = BundleBuilder::new(src.path(), out.path(), "wheel_server", host)
            .build()
            .unwrap();
        store.publish(staged).unwrap();

        let again = instance.manifest("wheel_server").await.unwrap();
        assert_eq!(first.build_id, again.build_id);
        assert!(instance.load("wheel_server/echo").await.is_ok());
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_unavailable() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::write(src.path().join("echo.wat"), ECHO).unwrap();
        let (host, store) = published(&src, &out).await;

        let bundle = store.current().unwrap();
        let spec = &bundle.manifest.resolve("echo").unwrap().load_spec;
        fs::write(out.path().join(&spec.path), "(module)").unwrap();

        let remote: Arc<dyn RemoteSource> = Arc::new(StoreRemote::new("wheel_server", store));
        let instance = RuntimeInstance::new(host, &[remote]);
        let err = instance.load("wheel_server/echo").await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }
}
