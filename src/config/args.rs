//! Command-line arguments for the Pulse function host
//!
//! This module defines the CLI arguments structure using clap.

use clap::Parser;
use std::path::PathBuf;

use super::defaults::*;

/// Command-line arguments for the Pulse function host
#[derive(Parser, Debug, Clone)]
#[command(name = "pulse-remote")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Builds server functions into a federated remote bundle and serves them")]
pub struct ServerArgs {
    /// Path to configuration file (TOML format)
    /// If not specified, looks for pulse.toml in the current directory
    #[arg(short, long, env = "PULSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Generate example configuration file and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Host mode: development (watch + rebuild), preview (one-shot build),
    /// production (static files only)
    #[arg(long, env = "PULSE_MODE", default_value = DEFAULT_MODE)]
    pub mode: String,

    /// Address to listen on
    #[arg(long, env = "PULSE_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: String,

    /// Extension id; the remote is published as `<id>_server`
    #[arg(long, env = "PULSE_EXTENSION_ID", default_value = DEFAULT_EXTENSION_ID)]
    pub extension_id: String,

    /// Extension version, used in the static URL layout
    #[arg(long, env = "PULSE_EXTENSION_VERSION", default_value = DEFAULT_EXTENSION_VERSION)]
    pub extension_version: String,

    /// Human readable extension name
    #[arg(long, env = "PULSE_DISPLAY_NAME")]
    pub display_name: Option<String>,

    /// Extension description
    #[arg(long, env = "PULSE_DESCRIPTION")]
    pub description: Option<String>,

    /// Function source root
    #[arg(long, env = "PULSE_FUNCTIONS_DIR", default_value = DEFAULT_FUNCTIONS_DIR)]
    pub functions_dir: PathBuf,

    /// Build output directory (bundles land in `<dist>/server`)
    #[arg(long, env = "PULSE_DIST_DIR", default_value = DEFAULT_DIST_DIR)]
    pub dist_dir: PathBuf,

    /// Keep watching and rebuilding in preview mode
    #[arg(long, env = "PULSE_WATCH")]
    pub watch: bool,

    /// Source poll interval in milliseconds
    #[arg(long, env = "PULSE_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Number of build directories kept on disk
    #[arg(long, env = "PULSE_RETAIN_BUILDS", default_value_t = DEFAULT_RETAIN_BUILDS)]
    pub retain_builds: usize,

    /// Runtime instance reuse: always-fresh or cached
    #[arg(long, env = "PULSE_FRESHNESS", default_value = DEFAULT_FRESHNESS)]
    pub freshness: String,

    /// Manifest URL of the remote. Defaults to this host's own bundle
    #[arg(long, env = "PULSE_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Timeout for fetching from an HTTP remote, in milliseconds
    #[arg(long, env = "PULSE_REMOTE_TIMEOUT_MS", default_value_t = DEFAULT_REMOTE_TIMEOUT_MS)]
    pub remote_timeout_ms: u64,

    /// Fuel budget per invocation
    #[arg(long, env = "PULSE_FUEL", default_value_t = DEFAULT_FUEL)]
    pub fuel: u64,

    /// Maximum guest memory per invocation, in MB
    #[arg(long, env = "PULSE_MAX_MEMORY_MB", default_value_t = DEFAULT_MAX_MEMORY_MB)]
    pub max_memory_mb: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PULSE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,
}
