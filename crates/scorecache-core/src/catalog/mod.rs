//! Deduplicated catalog of tournaments, clubs and players.
//!
//! - `ids`: id derivation for records the upstream sends without one
//! - `store`: the in-memory catalog with per-kind merge rules
//! - `upsert`: turns upstream payloads into catalog upserts
//! - `sync`: snapshot-gated ingest of tournament-detail views

pub mod ids;
pub mod store;
pub mod sync;
pub mod upsert;

pub use ids::{derive_id, slugify, EntityKind};
pub use store::{CatalogCounts, CatalogStore};
pub use sync::{DetailSync, DetailSyncReport, OVERVIEW_VIEW};
pub use upsert::{CatalogUpserter, IngestSummary};
