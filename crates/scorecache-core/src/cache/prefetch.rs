//! Background warm-up of upcoming days.
//!
//! Once per category, the prefetcher loads `[today, today + window]` into
//! the cache in small batches with a pause between them to stay under the
//! upstream rate limit. Every run holds one cancellation token; a later
//! category or selection change cancels it, which drops the running batch
//! and every batch not yet started.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::timezone;

use super::{MatchCache, Selection};

#[derive(Debug, Clone)]
pub struct PrefetchPolicy {
    pub window_days: u32,
    pub batch_size: usize,
    pub pause: Duration,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self {
            window_days: 7,
            batch_size: 3,
            pause: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchState {
    NotStarted,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub fetched: usize,
    pub failed: usize,
    /// Days already fresh in the cache.
    pub skipped: usize,
    pub cancelled: bool,
}

struct Tracker {
    category: Option<String>,
    state: PrefetchState,
    cancel: CancellationToken,
}

pub struct Prefetcher {
    cache: Arc<MatchCache>,
    policy: PrefetchPolicy,
    tracker: Mutex<Tracker>,
}

impl Prefetcher {
    pub fn new(cache: Arc<MatchCache>, policy: PrefetchPolicy) -> Self {
        Self {
            cache,
            policy,
            tracker: Mutex::new(Tracker {
                category: None,
                state: PrefetchState::NotStarted,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Category-change event. Cancels any run for the previous category
    /// and resets the state; selecting the current category again is a no-op.
    pub async fn select_category(&self, sport: &str) {
        let mut tracker = self.tracker.lock().await;
        if tracker.category.as_deref() == Some(sport) {
            return;
        }
        tracker.cancel.cancel();
        tracker.category = Some(sport.to_string());
        tracker.state = PrefetchState::NotStarted;
        tracker.cancel = CancellationToken::new();
        debug!(sport = sport, "Prefetch category selected");
    }

    /// Selection changed within the same category: abort the running prefetch.
    pub async fn cancel(&self) {
        let tracker = self.tracker.lock().await;
        tracker.cancel.cancel();
    }

    pub async fn state(&self, sport: &str) -> PrefetchState {
        let tracker = self.tracker.lock().await;
        if tracker.category.as_deref() == Some(sport) {
            tracker.state
        } else {
            PrefetchState::NotStarted
        }
    }

    /// Warm the window around `selection`, skipping the day it displays.
    /// Runs at most once per category; later calls return an empty report.
    pub async fn run(&self, selection: &Selection) -> PrefetchReport {
        self.select_category(&selection.sport).await;

        let cancel = {
            let mut tracker = self.tracker.lock().await;
            if tracker.state != PrefetchState::NotStarted {
                return PrefetchReport::default();
            }
            if tracker.cancel.is_cancelled() {
                tracker.cancel = CancellationToken::new();
            }
            tracker.state = PrefetchState::InProgress;
            tracker.cancel.clone()
        };

        let now = self.cache.now();
        let days: Vec<String> = timezone::day_range(now, selection.timezone.as_deref(), 0, self.policy.window_days)
            .into_iter()
            .filter(|day| *day != selection.day)
            .collect();

        info!(sport = %selection.sport, days = days.len(), "Prefetch started");
        let report = self.fetch_batches(selection, &days, &cancel).await;
        info!(
            sport = %selection.sport,
            fetched = report.fetched,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Prefetch finished"
        );

        let mut tracker = self.tracker.lock().await;
        let still_current = tracker.category.as_deref() == Some(selection.sport.as_str())
            && tracker.state == PrefetchState::InProgress;
        if still_current {
            tracker.state = if report.cancelled {
                PrefetchState::NotStarted
            } else {
                PrefetchState::Done
            };
        }
        report
    }

    async fn fetch_batches(&self, selection: &Selection, days: &[String], cancel: &CancellationToken) -> PrefetchReport {
        let mut report = PrefetchReport::default();

        for (index, batch) in days.chunks(self.policy.batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.policy.pause) => {}
                }
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let futures: Vec<_> = batch
                .iter()
                .map(|day| {
                    let key = selection.key_for(day.clone());
                    async move {
                        if self.cache.is_stale(&key).await == Some(false) {
                            return None;
                        }
                        Some(self.cache.fetch_into(&key, cancel).await.is_ok())
                    }
                })
                .collect();

            for outcome in futures::future::join_all(futures).await {
                match outcome {
                    None => report.skipped += 1,
                    Some(true) => report.fetched += 1,
                    Some(false) => report.failed += 1,
                }
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
        }
        report
    }

    pub fn spawn(self: Arc<Self>, selection: Selection) -> JoinHandle<PrefetchReport> {
        tokio::spawn(async move { self.run(&selection).await })
    }
}
