//! In-memory match cache and the tasks that keep it fresh.
//!
//! - `MatchCache`: read-through cache keyed by (day, sport) with a
//!   stale-while-revalidate policy; entries go stale after 2 minutes
//! - `LivePoller`: merges live scores into today's bucket every 30 seconds
//! - `Prefetcher`: warms the coming week in rate-limited batches
//!
//! All three write through `MatchCache`, which only ever replaces an entry
//! whole or merges the live fields of its records under one write lock.

pub mod entry;
pub mod manager;
pub mod poller;
pub mod prefetch;

pub use entry::CachedData;
pub use manager::{CacheKey, CachePolicy, CacheRead, CacheReadState, MatchCache, DEFAULT_CACHE_TTL};
pub use poller::{LivePoller, PollAction, PollerPolicy, Selection};
pub use prefetch::{PrefetchPolicy, PrefetchReport, PrefetchState, Prefetcher};
