//! Content-hash snapshots of raw upstream payloads.

pub mod canonical;
pub mod store;

pub use canonical::{canonical_json, content_hash};
pub use store::{CaptureResult, FetchOutcome, SnapshotKey, TabSnapshot, TabSnapshotStore};
