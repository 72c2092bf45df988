//! Configuration module for Pulse
//!
//! This module is organized into submodules:
//! - `defaults` - Default constants and values
//! - `args` - CLI argument definitions
//! - `file` - TOML configuration file
//! - `merge` - File values merged under CLI arguments

mod args;
mod defaults;
pub mod file;
mod merge;

pub use args::ServerArgs;
pub use defaults::*;
pub use file::ConfigFile;
pub use merge::merge_config_with_args;

use crate::error::{ConfigError, FederationError, Result};
use crate::federation::host::HostLimits;
use crate::federation::loader::FreshnessPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use defaults::DEFAULT_HTTP_SOCKET_ADDR;

/// Which host surface to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Initial build, watch sources, rebuild on change.
    #[default]
    Development,
    /// One-shot build, serve client assets and the bundle.
    Preview,
    /// Static files only; no builds and no dynamic loading.
    Production,
}

impl Mode {
    /// Whether this mode builds and serves functions at all.
    pub fn serves_functions(&self) -> bool {
        !matches!(self, Mode::Production)
    }

    /// Log prefix used by the host in this mode.
    pub fn log_prefix(&self) -> &'static str {
        match self {
            Mode::Development => "server",
            Mode::Preview => "server-preview",
            Mode::Production => "server-production",
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "preview" => Ok(Mode::Preview),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(format!(
                "unknown mode '{}' (expected development, preview or production)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Preview => write!(f, "preview"),
            Mode::Production => write!(f, "production"),
        }
    }
}

/// Extension metadata, written as `pulse.config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionMetadata {
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExtensionMetadata {
    /// Name of the remote this extension publishes (`<id>_server`).
    pub fn remote_name(&self) -> String {
        format!("{}_server", self.id)
    }
}

/// Complete configuration of the function host.
///
/// Loaded from CLI flags, `PULSE_*` environment variables, `pulse.toml` and
/// built-in defaults, in that order of precedence.
///
/// ```rust,ignore
/// use clap::Parser;
/// use pulse_remote::config::{ServerArgs, ServerConfig};
///
/// let config = ServerConfig::from_args(ServerArgs::parse())?;
/// config.validate()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub mode: Mode,

    /// Address to listen on
    pub http_addr: SocketAddr,

    pub extension: ExtensionMetadata,

    /// Function source root
    pub functions_dir: PathBuf,

    /// Build output root
    pub dist_dir: PathBuf,

    /// Keep watching after the initial build in preview mode
    pub watch: bool,

    pub poll_interval: Duration,

    pub retain_builds: usize,

    pub freshness: FreshnessPolicy,

    /// Manifest URL of an HTTP remote; `None` loads from this host's own store
    pub remote_url: Option<String>,

    pub remote_timeout: Duration,

    pub limits: HostLimits,

    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            http_addr: DEFAULT_HTTP_SOCKET_ADDR,
            extension: ExtensionMetadata {
                id: DEFAULT_EXTENSION_ID.to_string(),
                version: DEFAULT_EXTENSION_VERSION.to_string(),
                display_name: None,
                description: None,
            },
            functions_dir: PathBuf::from(DEFAULT_FUNCTIONS_DIR),
            dist_dir: PathBuf::from(DEFAULT_DIST_DIR),
            watch: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            retain_builds: DEFAULT_RETAIN_BUILDS,
            freshness: FreshnessPolicy::default(),
            remote_url: None,
            remote_timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
            limits: HostLimits {
                fuel: DEFAULT_FUEL,
                max_memory_bytes: DEFAULT_MAX_MEMORY_MB * 1024 * 1024,
            },
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from CLI arguments
    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let http_addr: SocketAddr = args
            .http_addr
            .parse()
            .map_err(|e| FederationError::Config(format!("Invalid HTTP address: {}", e)))?;

        let mode = args
            .mode
            .parse::<Mode>()
            .map_err(|e| FederationError::config("mode", e))?;

        let freshness = args
            .freshness
            .parse::<FreshnessPolicy>()
            .map_err(|e| FederationError::config("freshness", e))?;

        Ok(Self {
            mode,
            http_addr,
            extension: ExtensionMetadata {
                id: args.extension_id,
                version: args.extension_version,
                display_name: args.display_name,
                description: args.description,
            },
            functions_dir: args.functions_dir,
            dist_dir: args.dist_dir,
            watch: args.watch,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            retain_builds: args.retain_builds,
            freshness,
            remote_url: args.remote_url,
            remote_timeout: Duration::from_millis(args.remote_timeout_ms),
            limits: HostLimits {
                fuel: args.fuel,
                max_memory_bytes: args.max_memory_mb.saturating_mul(1024 * 1024),
            },
            log_level: args.log_level,
        })
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.extension.id.is_empty() {
            return Err(ConfigError::missing("extension id").into());
        }
        if self.extension.id.contains('-') {
            return Err(FederationError::config(
                "extension id",
                format!("'{}' must not contain '-'", self.extension.id),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(FederationError::config(
                "poll_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.retain_builds == 0 {
            return Err(FederationError::config("retain_builds", "must be at least 1"));
        }
        if self.limits.fuel == 0 {
            return Err(FederationError::config("fuel", "must be greater than 0"));
        }
        if self.limits.max_memory_bytes == 0 {
            return Err(FederationError::config("max_memory_mb", "must be greater than 0"));
        }
        if let Some(url) = &self.remote_url {
            reqwest::Url::parse(url)
                .map_err(|e| FederationError::config("remote_url", e.to_string()))?;
        }
        Ok(())
    }

    /// Remote name published by this host (`<id>_server`).
    pub fn remote_name(&self) -> String {
        self.extension.remote_name()
    }

    /// Bundle output directory (`<dist>/server`).
    pub fn server_dir(&self) -> PathBuf {
        self.dist_dir.join("server")
    }

    /// Client asset directory (`<dist>/client`).
    pub fn client_dir(&self) -> PathBuf {
        self.dist_dir.join("client")
    }

    /// Static URL prefix used in development and production (`/<id>/<version>`).
    pub fn static_prefix(&self) -> String {
        format!("/{}/{}", self.extension.id, self.extension.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_default_args() {
        let config = ServerConfig::from_args(ServerArgs::parse_from(["pulse-remote"])).unwrap();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.http_addr.port(), 3030);
        assert_eq!(config.freshness, FreshnessPolicy::AlwaysFresh);
        assert_eq!(config.retain_builds, 3);
        assert!(config.validate().is_ok());
        assert_eq!(config.remote_name(), "extension_server");
        assert_eq!(config.server_dir(), PathBuf::from("./dist/server"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let args = ServerArgs::parse_from(["pulse-remote", "--mode", "staging"]);
        assert!(ServerConfig::from_args(args).is_err());

        let args = ServerArgs::parse_from(["pulse-remote", "--http-addr", "nope"]);
        assert!(ServerConfig::from_args(args).is_err());

        let args = ServerArgs::parse_from(["pulse-remote", "--freshness", "sometimes"]);
        assert!(ServerConfig::from_args(args).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.extension.id = "my-ext".to_string();
        assert!(config.validate().is_err());

        config.extension.id = String::new();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            retain_builds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.limits.fuel = 0;
        assert!(config.validate().is_err());

        let config = ServerConfig {
            remote_url: Some("::not a url::".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_parse_and_prefix() {
        assert_eq!("prod".parse::<Mode>().unwrap(), Mode::Production);
        assert_eq!("Preview".parse::<Mode>().unwrap(), Mode::Preview);
        assert_eq!(Mode::Preview.log_prefix(), "server-preview");
        assert!(!Mode::Production.serves_functions());
    }

    #[test]
    fn test_extension_metadata_json() {
        let metadata = ExtensionMetadata {
            id: "wheel".to_string(),
            version: "1.0.0".to_string(),
            display_name: None,
            description: Some("Spins".to_string()),
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["id"], "wheel");
        assert!(json.get("displayName").is_none());
        assert_eq!(json["description"], "Spins");
        assert_eq!(metadata.remote_name(), "wheel_server");
    }
}
