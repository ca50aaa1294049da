//! Upstream feed access.
//!
//! This module provides the [`MatchFeed`] seam the cache, poller and
//! prefetcher fetch through, the reqwest-backed [`FeedClient`] that
//! implements it, and the bounded-fetch wrapper that turns every upstream
//! failure into a structured [`ApiError`] instead of a panic.

pub mod client;
pub mod error;
pub mod fetch;

use async_trait::async_trait;

use crate::models::Match;

pub use client::FeedClient;
pub use error::ApiError;
pub use fetch::{bounded, or_empty, FetchResult, DEFAULT_FETCH_TIMEOUT};

/// Source of canonical match lists, keyed by day and sport.
#[async_trait]
pub trait MatchFeed: Send + Sync {
    /// All matches for a calendar day (`YYYY-MM-DD`) in one sport. The day
    /// is bucketed in `zone`, a canonical IANA name, or in UTC when `None`.
    async fn fetch_day(&self, day: &str, sport: &str, zone: Option<&str>) -> FetchResult<Vec<Match>>;

    /// Only the matches currently in progress for a sport.
    async fn fetch_live(&self, sport: &str) -> FetchResult<Vec<Match>>;
}
