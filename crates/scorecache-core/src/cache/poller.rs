//! Live-score poller for the day currently on screen.
//!
//! While the selected day is today, every interval fetches the live-only
//! feed and merges status, score and clock into today's cached bucket. On
//! every `full_refresh_every`-th cycle where the bucket is also past the
//! cache TTL, the whole day is refetched instead to correct drift from
//! partial merges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::timezone;

use super::{CacheKey, MatchCache};

#[derive(Debug, Clone)]
pub struct PollerPolicy {
    pub interval: Duration,
    /// Every n-th cycle may become a full refetch when the bucket is stale.
    pub full_refresh_every: u32,
}

impl Default for PollerPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            full_refresh_every: 2,
        }
    }
}

/// What the consumer currently has on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub day: String,
    pub sport: String,
    pub timezone: Option<String>,
}

impl Selection {
    pub fn new(day: impl Into<String>, sport: impl Into<String>, timezone: Option<String>) -> Self {
        Self {
            day: day.into(),
            sport: sport.into(),
            timezone,
        }
    }

    pub fn key(&self) -> CacheKey {
        self.key_for(self.day.clone())
    }

    /// Key for another day of the same sport, bucketed in this selection's zone.
    pub fn key_for(&self, day: impl Into<String>) -> CacheKey {
        CacheKey::new(day, self.sport.clone()).with_zone(timezone::resolve_zone(self.timezone.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// The selected day is not today; nothing to poll.
    Idle,
    Merged { updated: usize },
    FullRefresh { count: usize },
    Failed,
}

#[derive(Debug, Clone, Copy)]
enum PassKind {
    Tick,
    Merge,
}

pub struct LivePoller {
    cache: Arc<MatchCache>,
    policy: PollerPolicy,
    cycle: AtomicU64,
}

impl LivePoller {
    pub fn new(cache: Arc<MatchCache>, policy: PollerPolicy) -> Self {
        Self {
            cache,
            policy,
            cycle: AtomicU64::new(0),
        }
    }

    fn is_today(&self, selection: &Selection) -> bool {
        selection.day == timezone::day_key(self.cache.now(), selection.timezone.as_deref())
    }

    /// One timer tick.
    pub async fn poll_once(&self, selection: &Selection, cancel: &CancellationToken) -> PollAction {
        if !self.is_today(selection) {
            return PollAction::Idle;
        }

        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let key = selection.key();
        let every = u64::from(self.policy.full_refresh_every.max(1));
        let full_refresh_due = cycle % every == 0 && self.cache.is_stale(&key).await == Some(true);

        if full_refresh_due {
            return match self.cache.fetch_into(&key, cancel).await {
                Ok(matches) => {
                    debug!(key = %key, cycle, count = matches.len(), "Poller full refresh");
                    PollAction::FullRefresh { count: matches.len() }
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(key = %key, error = %e, "Poller full refresh failed");
                    }
                    PollAction::Failed
                }
            };
        }

        self.merge_pass(&key, cancel).await
    }

    /// Immediate merge pass outside the timer, used when the category changes.
    pub async fn merge_now(&self, selection: &Selection, cancel: &CancellationToken) -> PollAction {
        if !self.is_today(selection) {
            return PollAction::Idle;
        }
        self.merge_pass(&selection.key(), cancel).await
    }

    async fn merge_pass(&self, key: &CacheKey, cancel: &CancellationToken) -> PollAction {
        let live = match self.cache.fetch_live(&key.sport, cancel).await {
            Ok(live) => live,
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(sport = %key.sport, error = %e, "Live fetch failed");
                }
                return PollAction::Failed;
            }
        };

        match self.cache.merge_live(key, &live, cancel).await {
            Ok(updated) => {
                debug!(key = %key, live = live.len(), updated, "Merged live fields");
                PollAction::Merged { updated }
            }
            Err(_) => PollAction::Failed,
        }
    }

    /// Poll until `shutdown` fires, following selection changes.
    ///
    /// Tick work runs as its own task under the current selection's token,
    /// so the loop keeps watching for changes while a fetch is in flight. A
    /// change cancels that token, which drops the old selection's fetch
    /// before the new selection's merge starts.
    pub async fn run(self: Arc<Self>, mut selection: watch::Receiver<Selection>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut current = selection.borrow_and_update().clone();
        let mut round = shutdown.child_token();
        let mut in_flight: Option<JoinHandle<PollAction>> = None;
        info!(sport = %current.sport, day = %current.day, "Live poller started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = selection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = selection.borrow_and_update().clone();
                    round.cancel();
                    round = shutdown.child_token();

                    let category_changed = next.sport != current.sport;
                    current = next;
                    if category_changed {
                        debug!(sport = %current.sport, "Category changed, merging immediately");
                        in_flight = Some(self.spawn_pass(PassKind::Merge, &current, &round));
                    }
                }
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|task| !task.is_finished()) {
                        debug!(sport = %current.sport, "Previous poll still running, skipping tick");
                        continue;
                    }
                    in_flight = Some(self.spawn_pass(PassKind::Tick, &current, &round));
                }
            }
        }

        round.cancel();
        if let Some(task) = in_flight {
            let _ = task.await;
        }
        info!("Live poller stopped");
    }

    fn spawn_pass(self: &Arc<Self>, kind: PassKind, selection: &Selection, round: &CancellationToken) -> JoinHandle<PollAction> {
        let poller = Arc::clone(self);
        let selection = selection.clone();
        let round = round.clone();
        tokio::spawn(async move {
            match kind {
                PassKind::Tick => poller.poll_once(&selection, &round).await,
                PassKind::Merge => poller.merge_now(&selection, &round).await,
            }
        })
    }

    pub fn spawn(self: Arc<Self>, selection: watch::Receiver<Selection>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(selection, shutdown))
    }
}
