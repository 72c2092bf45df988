//! Runtime loader
//!
//! Single entry point used by the request adapter: given a lookup key and a
//! request, obtain a [`RuntimeInstance`] according to the configured
//! [`FreshnessPolicy`] and run the handler.

use crate::error::Result;
use crate::federation::host::WasmHost;
use crate::federation::instance::RuntimeInstance;
use crate::federation::remote::RemoteSource;
use crate::functions::protocol::{HandlerOutput, NormalizedRequest};
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// How long a runtime instance (and the manifest it fetched) is reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FreshnessPolicy {
    /// New instance per call; every call sees the latest published manifest.
    #[default]
    AlwaysFresh,
    /// One shared instance until [`RuntimeLoader::invalidate`] is called.
    Cached,
}

impl std::str::FromStr for FreshnessPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always-fresh" | "always_fresh" | "fresh" => Ok(FreshnessPolicy::AlwaysFresh),
            "cached" => Ok(FreshnessPolicy::Cached),
            other => Err(format!(
                "unknown freshness policy '{}' (expected always-fresh or cached)",
                other
            )),
        }
    }
}

impl std::fmt::Display for FreshnessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FreshnessPolicy::AlwaysFresh => write!(f, "always-fresh"),
            FreshnessPolicy::Cached => write!(f, "cached"),
        }
    }
}

pub struct RuntimeLoader {
    host: WasmHost,
    remotes: Vec<Arc<dyn RemoteSource>>,
    policy: FreshnessPolicy,
    cached: ArcSwapOption<RuntimeInstance>,
}

impl RuntimeLoader {
    pub fn new(host: WasmHost, policy: FreshnessPolicy) -> Self {
        Self {
            host,
            remotes: Vec::new(),
            policy,
            cached: ArcSwapOption::empty(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remotes.push(remote);
        self
    }

    pub fn policy(&self) -> FreshnessPolicy {
        self.policy
    }

    /// Instance to use for the next call.
    pub fn instance(&self) -> Arc<RuntimeInstance> {
        match self.policy {
            FreshnessPolicy::AlwaysFresh => self.fresh_instance(),
            FreshnessPolicy::Cached => {
                if let Some(instance) = self.cached.load_full() {
                    return instance;
                }
                let instance = self.fresh_instance();
                // Another caller may have raced us here; either instance is valid.
                self.cached.store(Some(instance.clone()));
                instance
            }
        }
    }

    /// Drop the cached instance so the next call re-reads the manifest.
    pub fn invalidate(&self) {
        if self.cached.swap(None).is_some() {
            debug!("Runtime instance invalidated");
        }
    }

    /// Resolve `key` and run its handler with `request`.
    pub async fn load_and_invoke(
        &self,
        key: &str,
        request: NormalizedRequest,
    ) -> Result<HandlerOutput> {
        self.instance().invoke(key, request).await
    }

    fn fresh_instance(&self) -> Arc<RuntimeInstance> {
        Arc::new(RuntimeInstance::new(self.host.clone(), &self.remotes))
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
    use std::path::Path;
    use tempfile::TempDir;

    const PING: &str = include_str!("../../functions/ping.wat");

    fn publish(src: &Path, out: &Path, host: &WasmHost, store: &BundleStore) {
        let staged = BundleBuilder::new(src, out, "wheel_server", host.clone())
            .build()
            .unwrap();
        store.publish(staged).unwrap();
    }

    fn loader(policy: FreshnessPolicy) -> (TempDir, TempDir, WasmHost, Arc<BundleStore>, RuntimeLoader) {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let host = WasmHost::new(HostLimits::default()).unwrap();
        let store = Arc::new(BundleStore::new(out.path(), 3));
        fs::write(src.path().join("ping.wat"), PING).unwrap();
        publish(src.path(), out.path(), &host, &store);

        let loader = RuntimeLoader::new(host.clone(), policy)
            .with_remote(Arc::new(StoreRemote::new("wheel_server", store.clone())));
        (src, out, host, store, loader)
    }

    #[tokio::test]
    async fn test_always_fresh_sees_new_publish() {
        let (src, out, host, store, loader) = loader(FreshnessPolicy::AlwaysFresh);
        assert!(loader
            .load_and_invoke("wheel_server/ping", NormalizedRequest::get("http://x/"))
            .await
            .is_ok());

        fs::remove_file(src.path().join("ping.wat")).unwrap();
        publish(src.path(), out.path(), &host, &store);

        let err = loader
            .load_and_invoke("wheel_server/ping", NormalizedRequest::get("http://x/"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_cached_needs_invalidate() {
        let (src, out, host, store, loader) = loader(FreshnessPolicy::Cached);
        let first = loader.instance();
        assert!(Arc::ptr_eq(&first, &loader.instance()));
        assert!(loader
            .load_and_invoke("wheel_server/ping", NormalizedRequest::get("http://x/"))
            .await
            .is_ok());

        fs::remove_file(src.path().join("ping.wat")).unwrap();
        publish(src.path(), out.path(), &host, &store);

        // Still served from the cached manifest snapshot.
        assert!(loader
            .load_and_invoke("wheel_server/ping", NormalizedRequest::get("http://x/"))
            .await
            .is_ok());

        loader.invalidate();
        let err = loader
            .load_and_invoke("wheel_server/ping", NormalizedRequest::get("http://x/"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("cached".parse::<FreshnessPolicy>().unwrap(), FreshnessPolicy::Cached);
        assert_eq!(
            "always-fresh".parse::<FreshnessPolicy>().unwrap(),
            FreshnessPolicy::AlwaysFresh
        );
        assert!("sometimes".parse::<FreshnessPolicy>().is_err());
        assert_eq!(FreshnessPolicy::default().to_string(), "always-fresh");
    }
}
