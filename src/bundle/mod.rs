//! Remote bundle build and publish
//!
//! - [`manifest`]: the published name → entry mapping
//! - [`builder`]: compiles the source tree into a staged build
//! - [`store`]: the atomically swapped current bundle
//! - [`pipeline`]: single-flight, coalescing rebuilds
//! - [`watcher`]: polling trigger for development mode

pub mod builder;
pub mod manifest;
pub mod pipeline;
pub mod store;
pub mod watcher;

pub use builder::{BundleBuilder, StagedBuild};
pub use manifest::{EntryFormat, LoadSpec, Manifest, ManifestEntry, MANIFEST_FILE};
pub use pipeline::{wait_for_build, BuildOutcome, BuildPipeline, BuildReport, BuildTrigger};
pub use store::{BundleStore, PublishedBundle};
pub use watcher::{fingerprint, Fingerprint, SourceWatcher};
