//! scorecache-core - keeps a local mirror of a third-party sports-results feed.
//!
//! This crate contains the platform-independent sync layer:
//! - `api`: upstream client, bounded fetch and the `MatchFeed` seam
//! - `models`: canonical matches, raw upstream shapes, catalog entities
//! - `cache`: read-through cache, live poller and prefetcher
//! - `catalog`: deduplicated tournaments, clubs and players
//! - `snapshot`: content-hash change detection for raw payloads
//! - `service`: the outbound matches query
//! - `timezone`, `clock`, `config`: day bucketing, time source and settings
//!
//! Everything lives in process memory; a restart starts from an empty cache
//! and catalog.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod models;
pub mod service;
pub mod snapshot;
pub mod timezone;

// Re-export commonly used types at crate root
pub use api::{ApiError, FeedClient, FetchResult, MatchFeed};
pub use cache::{CacheKey, LivePoller, MatchCache, Prefetcher, Selection};
pub use catalog::{CatalogStore, CatalogUpserter, DetailSync};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::SyncConfig;
pub use models::{Match, MatchStatus};
pub use service::{MatchQuery, MatchService, MatchesResponse, ServiceError};
pub use snapshot::{SnapshotKey, TabSnapshotStore};
