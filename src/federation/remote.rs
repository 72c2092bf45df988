//! Remote sources
//!
//! A remote is anything that can hand out a bundle manifest and the payload of
//! each of its entries. [`HttpRemote`] fetches them from a host serving
//! `/.server-function/`; [`StoreRemote`] reads the current bundle of a
//! [`BundleStore`] living in the same process.

use crate::bundle::manifest::{LoadSpec, Manifest};
use crate::bundle::store::BundleStore;
use crate::error::{FederationError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of a remote bundle.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Remote name (`<extension id>_server`).
    fn name(&self) -> &str;

    /// Fetch the current manifest.
    async fn fetch_manifest(&self) -> Result<Manifest>;

    /// Fetch the payload described by `spec`.
    async fn fetch_entry(&self, spec: &LoadSpec) -> Result<Bytes>;
}

/// Remote fetched over HTTP.
///
/// Entry paths in the manifest are resolved relative to the manifest URL.
pub struct HttpRemote {
    name: String,
    manifest_url: Url,
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(name: impl Into<String>, manifest_url: &str, timeout: Duration) -> Result<Self> {
        let manifest_url = Url::parse(manifest_url).map_err(|e| {
            FederationError::config("remote_url", format!("invalid URL '{}': {}", manifest_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FederationError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            manifest_url,
            client,
        })
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    /// URL of one entry, relative to the manifest.
    ///
    /// Each path segment is percent-encoded, so file names containing `#`,
    /// `?` or `%` stay part of the path.
    pub fn entry_url(&self, spec: &LoadSpec) -> Result<Url> {
        if spec
            .path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(FederationError::remote(
                "resolve entry URL",
                format!("invalid entry path '{}'", spec.path),
            ));
        }

        let mut url = self.manifest_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| {
                FederationError::remote(
                    "resolve entry URL",
                    format!("{} cannot be a base URL", self.manifest_url),
                )
            })?
            .pop()
            .extend(spec.path.split('/'));
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Bytes> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FederationError::remote("fetch", format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(FederationError::remote(
                "fetch",
                format!("{} returned {}", url, response.status()),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|e| FederationError::remote("fetch", format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_manifest(&self) -> Result<Manifest> {
        debug!(remote = %self.name, url = %self.manifest_url, "Fetching manifest");
        let body = self.get(self.manifest_url.clone()).await?;
        Manifest::from_json(&body)
            .map_err(|e| FederationError::remote("parse manifest", e.to_string()))
    }

    async fn fetch_entry(&self, spec: &LoadSpec) -> Result<Bytes> {
        let url = self.entry_url(spec)?;
        self.get(url).await
    }
}

/// Remote backed by an in-process bundle store.
pub struct StoreRemote {
    name: String,
    store: Arc<BundleStore>,
}

impl StoreRemote {
    pub fn new(name: impl Into<String>, store: Arc<BundleStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

#[async_trait]
impl RemoteSource for StoreRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_manifest(&self) -> Result<Manifest> {
        self.store
            .current()
            .map(|bundle| bundle.manifest.clone())
            .ok_or_else(|| FederationError::remote("fetch manifest", "no bundle published yet"))
    }

    async fn fetch_entry(&self, spec: &LoadSpec) -> Result<Bytes> {
        self.store.read_entry(spec).await
    }
}
