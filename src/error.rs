//! Error types for the federation host
//!
//! This module defines the main error type used throughout the crate and the
//! structured domain errors for discovery, bundle builds, configuration and the
//! HTTP host. [`FederationError::status_code`] maps every failure onto the HTTP
//! status the request adapter reports to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for federation operations
pub type Result<T> = std::result::Result<T, FederationError>;

/// Structured discovery error domain
#[derive(Debug, Error, Clone)]
pub enum DiscoveryError {
    #[error("function source root {0:?} does not exist")]
    MissingRoot(PathBuf),
    #[error("cannot read {path:?}: {detail}")]
    Unreadable { path: PathBuf, detail: String },
    #[error("logical name '{name}' is produced by both {first:?} and {second:?}")]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}

impl DiscoveryError {
    pub fn unreadable(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Unreadable {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error still allows an (empty) manifest to be published
    pub fn is_degradable(&self) -> bool {
        matches!(self, DiscoveryError::MissingRoot(_))
    }
}

/// Structured bundle build error domain
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("{module} ({path:?}): {detail}")]
    Compile {
        module: String,
        path: PathBuf,
        detail: String,
    },
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("{operation}: {detail}")]
    Output { operation: String, detail: String },
}

impl BuildError {
    pub fn compile(
        module: impl Into<String>,
        path: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Compile {
            module: module.into(),
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn output(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Output {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

/// Structured configuration error domain
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    #[error("{setting}: {reason}")]
    InvalidSetting { setting: String, reason: String },
    #[error("missing {0}")]
    Missing(String),
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    pub fn invalid_setting(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(setting: impl Into<String>) -> Self {
        Self::Missing(setting.into())
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for ConfigError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

/// Structured server error domain
#[derive(Debug, Error, Clone)]
pub enum ServerError {
    #[error("bind failed on {address}: {reason}")]
    BindFailed { address: String, reason: String },
    #[error("{task}: {detail}")]
    TaskFailed { task: String, detail: String },
    #[error("{0}")]
    Message(String),
}

impl ServerError {
    pub fn bind_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn task_failed(task: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::TaskFailed {
            task: task.into(),
            detail: detail.into(),
        }
    }
}

/// Main error type for the federation host
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: {0}")]
    ConfigDomain(#[from] ConfigError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Unresolved function: {remote}/{name}")]
    UnresolvedFunction { remote: String, name: String },

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Invocation of '{function}' failed: {detail}")]
    Invocation { function: String, detail: String },

    #[error("WASM error: {0}")]
    Wasm(String),

    #[error("Server error: {0}")]
    ServerDomain(#[from] ServerError),

    #[error("Shutting down")]
    ShuttingDown,
}

impl FederationError {
    /// Create a configuration error with context
    pub fn config(setting: &str, reason: impl Into<String>) -> Self {
        FederationError::ConfigDomain(ConfigError::invalid_setting(setting, reason))
    }

    /// Create an unresolved-function error
    pub fn unresolved(remote: impl Into<String>, name: impl Into<String>) -> Self {
        FederationError::UnresolvedFunction {
            remote: remote.into(),
            name: name.into(),
        }
    }

    /// Create an invocation error for a specific function
    pub fn invocation(function: impl Into<String>, detail: impl Into<String>) -> Self {
        FederationError::Invocation {
            function: function.into(),
            detail: detail.into(),
        }
    }

    /// Create a remote-unavailable error with operation context
    pub fn remote(operation: &str, detail: impl Into<String>) -> Self {
        FederationError::RemoteUnavailable(format!("{}: {}", operation, detail.into()))
    }

    /// Create a server error for bind failures
    pub fn server_bind_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        FederationError::ServerDomain(ServerError::bind_failed(address, reason))
    }

    /// Create a server error for task failures
    pub fn server_task_failed(task: impl Into<String>, detail: impl Into<String>) -> Self {
        FederationError::ServerDomain(ServerError::task_failed(task, detail))
    }

    // ========== HTTP Status Mapping ==========

    /// HTTP status code the request adapter reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            FederationError::UnresolvedFunction { .. } => 404,
            FederationError::RemoteUnavailable(_) => 503,
            FederationError::ShuttingDown => 503,
            FederationError::Invocation { .. } => 500,
            FederationError::Wasm(_) => 500,
            FederationError::Io(_) | FederationError::Serialization(_) => 500,
            FederationError::Config(_) | FederationError::ConfigDomain(_) => 500,
            FederationError::Discovery(_) | FederationError::Build(_) => 500,
            FederationError::ServerDomain(_) => 500,
        }
    }

    /// Returns true if the failure is attributable to the caller's request
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
