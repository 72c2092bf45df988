#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Pulse Remote
//!
//! Builds a directory of server functions into a federated remote bundle and
//! serves them over HTTP, rebuilding on change during development.
//!
//! ## Pieces
//!
//! - **Discovery** ([`functions::discovery`]): every `.wasm`/`.wat` file under the
//!   source root becomes a function named after its relative path
//! - **Bundle** ([`bundle`]): compiles the tree into a build directory, publishes
//!   it atomically as `mf-manifest.json`, rebuilds single-flight
//! - **Federation** ([`federation`]): resolves `<remote>/<name>` against a
//!   manifest, loads the entry and runs it on a wasmtime host
//! - **Server** ([`server`]): maps `/server-function/<name>` requests onto the
//!   loader and serves bundle and client assets
//!
//! ## Quick Start
//!
//! ```bash
//! # Watch ./functions and serve on :3030
//! $ pulse-remote --extension-id wheel
//!
//! # Call a function
//! $ curl http://localhost:3030/server-function/hello/hello-world
//! {"message":"Hello, world!"}
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use pulse_remote::config::ServerConfig;
//! use pulse_remote::server::FunctionHost;
//!
//! # async fn run() -> pulse_remote::Result<()> {
//! let config = ServerConfig::default();
//! config.validate()?;
//! FunctionHost::new(config)?.run().await
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod bundle;
pub mod config;
pub mod error;
pub mod federation;
pub mod functions;
pub mod server;

pub use config::{Mode, ServerArgs, ServerConfig};
pub use error::{FederationError, Result};
pub use federation::{FreshnessPolicy, RuntimeLoader};
pub use functions::{HandlerOutput, NormalizedRequest, NormalizedResponse};
pub use server::FunctionHost;
