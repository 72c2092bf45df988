//! Configuration file support for Pulse
//!
//! This module provides TOML configuration file parsing and merging with CLI arguments.
//!
//! ## Priority Order
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values
//!
//! ## Example Configuration
//!
//! ```toml
//! # pulse.toml
//!
//! [extension]
//! id = "wheel"
//! version = "1.2.0"
//! display_name = "Wheel of Names"
//!
//! [server]
//! mode = "development"
//! http_addr = "0.0.0.0:3030"
//!
//! [functions]
//! dir = "./functions"
//! dist_dir = "./dist"
//! poll_interval_ms = 500
//! retain_builds = 3
//!
//! [runtime]
//! freshness = "always-fresh"
//! fuel = 50000000
//! max_memory_mb = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FederationError, Result};

/// Default config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "pulse.toml";

/// Root configuration structure for TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Extension metadata
    pub extension: ExtensionSection,

    /// Host configuration
    pub server: ServerSection,

    /// Function sources and bundle output
    pub functions: FunctionsSection,

    /// Handler runtime configuration
    pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionSection {
    pub id: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// development, preview or production
    pub mode: Option<String>,
    pub http_addr: Option<String>,
    pub log_level: Option<String>,
    /// Keep watching in preview mode
    pub watch: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionsSection {
    /// Function source root
    pub dir: Option<PathBuf>,
    pub dist_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub retain_builds: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// always-fresh or cached
    pub freshness: Option<String>,
    pub remote_url: Option<String>,
    pub remote_timeout_ms: Option<u64>,
    pub fuel: Option<u64>,
    pub max_memory_mb: Option<usize>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FederationError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            FederationError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Try to load `pulse.toml` from the working directory
    pub fn load_default() -> Option<Self> {
        Self::load_from_dir(Path::new("."))
    }

    /// Load `pulse.toml` from `dir`, if present and valid.
    ///
    /// Runs before logging is initialised, so messages go to stderr.
    pub fn load_from_dir(dir: &Path) -> Option<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return None;
        }
        match Self::load(&path) {
            Ok(config) => {
                eprintln!("Loaded configuration from {:?}", path);
                Some(config)
            }
            Err(e) => {
                eprintln!("Failed to load config from {:?}: {}", path, e);
                None
            }
        }
    }

    /// Generate an example configuration file
    pub fn generate_example() -> String {
        r#"# Pulse Configuration File
# Copy to pulse.toml and customize as needed
#
# Configuration priority (highest to lowest):
# 1. Command-line arguments
# 2. Environment variables
# 3. This configuration file
# 4. Default values

[extension]
# Extension id; must not contain '-'. The remote is named "<id>_server"
id = "extension"
version = "0.0.0"
# display_name = "My Extension"
# description = "What it does"

[server]
# development, preview or production
mode = "development"
http_addr = "0.0.0.0:3030"
log_level = "info"
# Keep watching and rebuilding in preview mode
watch = false

[functions]
# Function source root (.wasm / .wat files)
dir = "./functions"
# Build output; bundles land in <dist_dir>/server
dist_dir = "./dist"
poll_interval_ms = 500
retain_builds = 3

[runtime]
# always-fresh: re-read the manifest on every call
# cached: reuse until the next publish
freshness = "always-fresh"
# remote_url = "http://localhost:3030/.server-function/mf-manifest.json"
remote_timeout_ms = 10000
fuel = 50000000
max_memory_mb = 64
"#
        .to_string()
    }
}
