//! HTTP surface: request adapter, static files, and the host process

pub mod adapter;
pub mod assets;
pub mod http;

pub use adapter::{AdapterState, FUNCTION_PREFIX};
pub use assets::StaticDir;
pub use http::{local_network_ip, FunctionHost, BUNDLE_PREFIX};
