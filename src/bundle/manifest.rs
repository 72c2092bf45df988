//! Remote bundle manifest: the published mapping from logical name to entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known file name of the manifest document.
pub const MANIFEST_FILE: &str = "mf-manifest.json";

/// Directory (under the bundle root) holding one subdirectory per build.
pub const BUILDS_DIR: &str = "builds";

/// Directory (under a build) holding the compiled entries.
pub const ENTRIES_DIR: &str = "entries";

/// Manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// Encoding of an entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFormat {
    /// WebAssembly binary.
    Wasm,
    /// WebAssembly text.
    Wat,
}

impl EntryFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "wasm" => Some(EntryFormat::Wasm),
            "wat" => Some(EntryFormat::Wat),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            EntryFormat::Wasm => "wasm",
            EntryFormat::Wat => "wat",
        }
    }
}

/// Opaque token telling a loader how to fetch one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSpec {
    /// Path relative to the bundle root (the directory holding the manifest).
    pub path: String,
    /// Hex-encoded SHA-256 of the payload.
    pub sha256: String,
    pub size: u64,
    pub format: EntryFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Expose key, `./<name>`.
    pub expose: String,
    pub load_spec: LoadSpec,
}

/// Manifest of one remote bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// Remote name (`<extension id>_server`).
    pub remote: String,
    pub build_id: String,
    pub built_at: DateTime<Utc>,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new(remote: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            remote: remote.into(),
            build_id: build_id.into(),
            built_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Look up an entry by logical name.
    pub fn resolve(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
