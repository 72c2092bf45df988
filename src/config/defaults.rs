//! Default constants for Pulse configuration
//!
//! These constants define the default values used throughout the configuration
//! system when no explicit value is provided.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Default listen address for the dev/preview host
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3030";

/// Default HTTP socket address (const, no parsing needed)
pub(crate) const DEFAULT_HTTP_SOCKET_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 3030);

/// Default host mode
pub const DEFAULT_MODE: &str = "development";

/// Default function source root
pub const DEFAULT_FUNCTIONS_DIR: &str = "./functions";

/// Default build output directory
pub const DEFAULT_DIST_DIR: &str = "./dist";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default extension id
pub const DEFAULT_EXTENSION_ID: &str = "extension";

/// Default extension version
pub const DEFAULT_EXTENSION_VERSION: &str = "0.0.0";

/// Default source poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default number of build directories kept on disk
pub const DEFAULT_RETAIN_BUILDS: usize = 3;

/// Default runtime freshness policy
pub const DEFAULT_FRESHNESS: &str = "always-fresh";

/// Default fuel budget per invocation
pub const DEFAULT_FUEL: u64 = 50_000_000;

/// Default maximum guest memory in MB
pub const DEFAULT_MAX_MEMORY_MB: usize = 64;

/// Default timeout for fetching from an HTTP remote, in milliseconds
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;
