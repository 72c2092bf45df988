//! Server functions
//!
//! A server function is an independently deployable WebAssembly module living
//! under the function source root. This module covers the two things every
//! other layer needs to agree on: how functions are found and named
//! ([`discovery`]) and what they receive and return ([`protocol`]).

pub mod discovery;
pub mod protocol;

pub use discovery::{
    discover_functions, logical_name, lookup_key, split_lookup_key, DiscoveredFunction,
    Discovery, FUNCTION_EXTENSIONS,
};
pub use protocol::{HandlerOutput, NormalizedRequest, NormalizedResponse};
