//! Runtime federation
//!
//! Loading code by name is isolated here. The rest of the crate only sees
//! [`RuntimeLoader::load_and_invoke`]: a lookup key and a request go in, a
//! [`HandlerOutput`](crate::functions::HandlerOutput) comes out.

pub mod host;
pub mod instance;
pub mod loader;
pub mod remote;

pub use host::{HostLimits, WasmHost};
pub use instance::RuntimeInstance;
pub use loader::{FreshnessPolicy, RuntimeLoader};
pub use remote::{HttpRemote, RemoteSource, StoreRemote};
