//! Idempotent export pipeline
//!
//! - `entity_cache`: per-entity cache partitioned by scope
//! - `manifest`: run ids, artifact registration and manifest sealing
//! - `latest`: atomically replaced latest-run pointers

pub mod entity_cache;
pub mod latest;
pub mod manifest;

pub use entity_cache::{CacheEntry, CacheStatus, EntityCache};
pub use latest::{LatestPointer, LatestPointerStore, MANIFEST_ROLE};
pub use manifest::{ManifestFile, RunHandle, RunManifest, RunManifestBuilder, SealedRun};
