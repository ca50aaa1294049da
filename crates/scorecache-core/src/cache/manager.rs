use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{bounded, ApiError, FetchResult, MatchFeed, DEFAULT_FETCH_TIMEOUT};
use crate::clock::Clock;
use crate::models::Match;

use super::CachedData;

/// Consider a day bucket stale after 2 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(120);

/// One day bucket. `day` is a calendar day in `zone`; `None` means UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub day: String,
    pub sport: String,
    pub zone: Option<String>,
}

impl CacheKey {
    pub fn new(day: impl Into<String>, sport: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            sport: sport.into(),
            zone: None,
        }
    }

    /// Bucket the day in an already-resolved zone. UTC keeps the plain key.
    pub fn with_zone(mut self, zone: Option<Tz>) -> Self {
        self.zone = zone.map(|tz| tz.name().to_string()).filter(|name| name != "UTC");
        self
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "{}@{}[{}]", self.sport, self.day, zone),
            None => write!(f, "{}@{}", self.sport, self.day),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheReadState {
    /// Served from an entry younger than the TTL.
    Fresh,
    /// Served from an expired entry; a background refresh may be running.
    Stale,
    /// Cold key, fetched in the foreground.
    Fetched,
    /// Cold key whose foreground fetch failed or was superseded.
    Loading,
}

#[derive(Debug, Clone)]
pub struct CacheRead {
    pub matches: Vec<Match>,
    pub state: CacheReadState,
    pub fetched_at: Option<DateTime<Utc>>,
    /// True when this read started a background refresh.
    pub refresh_scheduled: bool,
}

impl CacheRead {
    pub fn is_loading(&self) -> bool {
        self.state == CacheReadState::Loading
    }
}

/// In-memory read-through cache of match lists keyed by (day, sport).
///
/// Absence of an entry means the key was never fetched; an empty list means
/// it was fetched and had no matches. Entries are replaced whole on fetch or
/// merged field-by-field by the live poller, always under the write lock, and
/// are never evicted.
pub struct MatchCache {
    feed: Arc<dyn MatchFeed>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    entries: RwLock<HashMap<CacheKey, CachedData<Vec<Match>>>>,
    refreshing: Mutex<HashSet<CacheKey>>,
    shutdown: CancellationToken,
}

impl MatchCache {
    pub fn new(feed: Arc<dyn MatchFeed>, clock: Arc<dyn Clock>, policy: CachePolicy) -> Self {
        Self {
            feed,
            clock,
            policy,
            entries: RwLock::new(HashMap::new()),
            refreshing: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Best currently-known matches for `key`.
    ///
    /// A cold key is fetched in the foreground under `cancel`. A stale entry
    /// is returned as-is and at most one background refresh is started for it.
    pub async fn get(self: &Arc<Self>, key: &CacheKey, cancel: &CancellationToken) -> CacheRead {
        let now = self.clock.now();
        let cached = self.entries.read().await.get(key).cloned();

        match cached {
            Some(entry) if !entry.is_stale(now, self.policy.ttl) => {
                debug!(key = %key, count = entry.data.len(), "Cache hit");
                CacheRead {
                    matches: entry.data,
                    state: CacheReadState::Fresh,
                    fetched_at: Some(entry.cached_at),
                    refresh_scheduled: false,
                }
            }
            Some(entry) => {
                let refresh_scheduled = self.schedule_refresh(key).await;
                debug!(key = %key, age = %entry.age_display(now), refresh_scheduled, "Cache hit, stale");
                CacheRead {
                    matches: entry.data,
                    state: CacheReadState::Stale,
                    fetched_at: Some(entry.cached_at),
                    refresh_scheduled,
                }
            }
            None => {
                debug!(key = %key, "Cache miss");
                match self.fetch_entry(key, cancel).await {
                    Ok(entry) => CacheRead {
                        matches: entry.data,
                        state: CacheReadState::Fetched,
                        fetched_at: Some(entry.cached_at),
                        refresh_scheduled: false,
                    },
                    Err(e) => {
                        if !e.is_cancelled() {
                            warn!(key = %key, error = %e, "Foreground fetch failed");
                        }
                        CacheRead {
                            matches: Vec::new(),
                            state: CacheReadState::Loading,
                            fetched_at: None,
                            refresh_scheduled: false,
                        }
                    }
                }
            }
        }
    }

    /// Fetch the whole day for `key` and replace its entry.
    pub async fn fetch_into(&self, key: &CacheKey, cancel: &CancellationToken) -> FetchResult<Vec<Match>> {
        self.fetch_entry(key, cancel).await.map(|entry| entry.data)
    }

    async fn fetch_entry(&self, key: &CacheKey, cancel: &CancellationToken) -> FetchResult<CachedData<Vec<Match>>> {
        let matches = bounded(
            self.policy.fetch_timeout,
            cancel,
            self.feed.fetch_day(&key.day, &key.sport, key.zone.as_deref()),
        )
        .await?;
        self.commit(key, matches, cancel).await
    }

    /// Fetch only in-progress matches for a sport.
    pub async fn fetch_live(&self, sport: &str, cancel: &CancellationToken) -> FetchResult<Vec<Match>> {
        bounded(self.policy.fetch_timeout, cancel, self.feed.fetch_live(sport)).await
    }

    /// Overwrite status, score and clock of cached matches that appear in `live`.
    /// Returns how many cached records changed hands; a missing entry merges nothing.
    pub async fn merge_live(
        &self,
        key: &CacheKey,
        live: &[Match],
        cancel: &CancellationToken,
    ) -> FetchResult<usize> {
        let mut entries = self.entries.write().await;
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        let Some(entry) = entries.get_mut(key) else {
            return Ok(0);
        };

        let by_id: HashMap<&str, &Match> = live.iter().map(|m| (m.id.as_str(), m)).collect();
        let mut updated = 0;
        for cached in entry.data.iter_mut() {
            if let Some(fresh) = by_id.get(cached.id.as_str()) {
                cached.merge_live(fresh);
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Single point where fetched data enters shared state.
    async fn commit(
        &self,
        key: &CacheKey,
        matches: Vec<Match>,
        cancel: &CancellationToken,
    ) -> FetchResult<CachedData<Vec<Match>>> {
        let mut entries = self.entries.write().await;
        if cancel.is_cancelled() {
            debug!(key = %key, "Dropping result for superseded selection");
            return Err(ApiError::Cancelled);
        }
        debug!(key = %key, count = matches.len(), "Committing cache entry");
        let entry = CachedData::new(matches, self.clock.now());
        entries.insert(key.clone(), entry.clone());
        Ok(entry)
    }

    async fn schedule_refresh(self: &Arc<Self>, key: &CacheKey) -> bool {
        if !self.refreshing.lock().await.insert(key.clone()) {
            return false;
        }

        let cache = Arc::clone(self);
        let key = key.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            match cache.fetch_into(&key, &cancel).await {
                Ok(matches) => debug!(key = %key, count = matches.len(), "Background refresh complete"),
                Err(e) => warn!(key = %key, error = %e, "Background refresh failed, keeping stale entry"),
            }
            cache.refreshing.lock().await.remove(&key);
        });
        true
    }

    pub async fn peek(&self, key: &CacheKey) -> Option<CachedData<Vec<Match>>> {
        self.entries.read().await.get(key).cloned()
    }

    /// `None` when the key was never fetched.
    pub async fn is_stale(&self, key: &CacheKey) -> Option<bool> {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.is_stale(now, self.policy.ttl))
    }

    pub async fn refresh_in_flight(&self, key: &CacheKey) -> bool {
        self.refreshing.lock().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Cancel background refreshes. Entries stay readable.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::models::{MatchClock, MatchStatus, PublicationStatus, Score, TeamSummary, TournamentSummary};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn sample_match(id: &str, status: MatchStatus) -> Match {
        let team = |name: &str| TeamSummary {
            id: Some(name.to_lowercase()),
            name: name.to_string(),
            logo: None,
            short_name: None,
        };
        Match {
            id: id.to_string(),
            tournament_id: Some("urc".to_string()),
            date: Utc.with_ymd_and_hms(2026, 2, 4, 19, 0, 0).unwrap(),
            status,
            score: Score::default(),
            clock: MatchClock::default(),
            home: team("Leinster"),
            away: team("Munster"),
            tournament: TournamentSummary {
                id: Some("urc".to_string()),
                name: "URC".to_string(),
                sport: "rugby".to_string(),
                status: PublicationStatus::Published,
            },
        }
    }

    #[derive(Default)]
    struct CountingFeed {
        day_calls: AtomicUsize,
        fail: AtomicBool,
        delay: Option<Duration>,
        matches: std::sync::Mutex<Vec<Match>>,
    }

    impl CountingFeed {
        fn with_matches(matches: Vec<Match>) -> Self {
            Self {
                matches: std::sync::Mutex::new(matches),
                ..Self::default()
            }
        }

        fn set_matches(&self, matches: Vec<Match>) {
            *self.matches.lock().unwrap() = matches;
        }

        fn calls(&self) -> usize {
            self.day_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MatchFeed for CountingFeed {
        async fn fetch_day(&self, _day: &str, _sport: &str, _zone: Option<&str>) -> FetchResult<Vec<Match>> {
            self.day_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::ServerError("boom".to_string()));
            }
            Ok(self.matches.lock().unwrap().clone())
        }

        async fn fetch_live(&self, _sport: &str) -> FetchResult<Vec<Match>> {
            Ok(Vec::new())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 4, 12, 0, 0).unwrap()
    }

    fn key() -> CacheKey {
        CacheKey::new("2026-02-04", "rugby")
    }

    fn build(feed: Arc<CountingFeed>, clock: &FakeClock) -> Arc<MatchCache> {
        Arc::new(MatchCache::new(feed, Arc::new(clock.clone()), CachePolicy::default()))
    }

    async fn settle(cache: &MatchCache, key: &CacheKey) {
        while cache.refresh_in_flight(key).await {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let feed = Arc::new(CountingFeed::with_matches(vec![sample_match("m1", MatchStatus::Scheduled)]));
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);

        let read = cache.get(&key(), &CancellationToken::new()).await;
        assert_eq!(read.state, CacheReadState::Fetched);
        assert_eq!(read.matches.len(), 1);
        assert_eq!(feed.calls(), 1);

        let entry = cache.peek(&key()).await.unwrap();
        assert_eq!(entry.cached_at, t0());
    }

    #[tokio::test]
    async fn test_empty_fetch_is_cached_as_empty() {
        let feed = Arc::new(CountingFeed::default());
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);

        let read = cache.get(&key(), &CancellationToken::new()).await;
        assert_eq!(read.state, CacheReadState::Fetched);
        assert!(read.matches.is_empty());
        assert!(cache.peek(&key()).await.is_some());

        let again = cache.get(&key(), &CancellationToken::new()).await;
        assert_eq!(again.state, CacheReadState::Fresh);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_network() {
        let feed = Arc::new(CountingFeed::with_matches(vec![sample_match("m1", MatchStatus::Scheduled)]));
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);
        cache.get(&key(), &CancellationToken::new()).await;

        clock.advance(chrono::Duration::seconds(30));
        let read = cache.get(&key(), &CancellationToken::new()).await;

        assert_eq!(read.state, CacheReadState::Fresh);
        assert!(!read.refresh_scheduled);
        settle(&cache, &key()).await;
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_hit_returns_old_value_and_refreshes_once() {
        let feed = Arc::new(CountingFeed::with_matches(vec![sample_match("m1", MatchStatus::Scheduled)]));
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);
        cache.get(&key(), &CancellationToken::new()).await;

        feed.set_matches(vec![
            sample_match("m1", MatchStatus::Live),
            sample_match("m2", MatchStatus::Scheduled),
        ]);
        clock.advance(chrono::Duration::seconds(150));

        let read = cache.get(&key(), &CancellationToken::new()).await;
        assert_eq!(read.state, CacheReadState::Stale);
        assert!(read.refresh_scheduled);
        assert_eq!(read.matches.len(), 1);
        assert_eq!(read.matches[0].status, MatchStatus::Scheduled);

        let second = cache.get(&key(), &CancellationToken::new()).await;
        assert!(!second.refresh_scheduled);

        settle(&cache, &key()).await;
        assert_eq!(feed.calls(), 2);

        let entry = cache.peek(&key()).await.unwrap();
        assert_eq!(entry.data.len(), 2);
        assert_eq!(entry.cached_at, t0() + chrono::Duration::seconds(150));
    }

    #[tokio::test]
    async fn test_failed_background_refresh_keeps_stale_entry() {
        let feed = Arc::new(CountingFeed::with_matches(vec![sample_match("m1", MatchStatus::Scheduled)]));
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);
        cache.get(&key(), &CancellationToken::new()).await;

        feed.fail.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(150));
        let read = cache.get(&key(), &CancellationToken::new()).await;
        assert!(read.refresh_scheduled);
        settle(&cache, &key()).await;

        let entry = cache.peek(&key()).await.unwrap();
        assert_eq!(entry.data.len(), 1);
        assert_eq!(entry.cached_at, t0());
        assert_eq!(cache.is_stale(&key()).await, Some(true));
    }

    #[tokio::test]
    async fn test_cold_failure_reports_loading() {
        let feed = Arc::new(CountingFeed::default());
        feed.fail.store(true, Ordering::SeqCst);
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);

        let read = cache.get(&key(), &CancellationToken::new()).await;
        assert!(read.is_loading());
        assert!(read.matches.is_empty());
        assert!(cache.peek(&key()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_is_not_committed() {
        let feed = Arc::new(CountingFeed {
            delay: Some(Duration::from_secs(5)),
            ..CountingFeed::with_matches(vec![sample_match("m1", MatchStatus::Scheduled)])
        });
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let read = cache.get(&key(), &cancel).await;
        assert!(read.is_loading());
        assert!(cache.peek(&key()).await.is_none());
    }

    struct CancellingFeed {
        token: CancellationToken,
    }

    #[async_trait]
    impl MatchFeed for CancellingFeed {
        async fn fetch_day(&self, _day: &str, _sport: &str, _zone: Option<&str>) -> FetchResult<Vec<Match>> {
            // Selection changes while the response is already on its way
            self.token.cancel();
            Ok(vec![sample_match("late", MatchStatus::Scheduled)])
        }

        async fn fetch_live(&self, _sport: &str) -> FetchResult<Vec<Match>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_late_response_after_cancel_is_discarded() {
        let token = CancellationToken::new();
        let feed = Arc::new(CancellingFeed { token: token.clone() });
        let cache = MatchCache::new(feed, Arc::new(FakeClock::new(t0())), CachePolicy::default());

        let result = cache.fetch_into(&key(), &token).await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(cache.peek(&key()).await.is_none());
    }

    #[tokio::test]
    async fn test_merge_live_updates_matching_records_only() {
        let feed = Arc::new(CountingFeed::with_matches(vec![
            sample_match("m1", MatchStatus::Scheduled),
            sample_match("m2", MatchStatus::Scheduled),
        ]));
        let clock = FakeClock::new(t0());
        let cache = build(feed.clone(), &clock);
        let cancel = CancellationToken::new();
        cache.get(&key(), &cancel).await;

        let mut live = sample_match("m2", MatchStatus::Live);
        live.score = Score { home: Some(12), away: Some(5) };
        live.home.name = "Ignored".to_string();
        let stranger = sample_match("m9", MatchStatus::Live);

        let updated = cache.merge_live(&key(), &[live, stranger], &cancel).await.unwrap();
        assert_eq!(updated, 1);

        let entry = cache.peek(&key()).await.unwrap();
        assert_eq!(entry.data.len(), 2);
        assert_eq!(entry.data[0].status, MatchStatus::Scheduled);
        assert_eq!(entry.data[1].status, MatchStatus::Live);
        assert_eq!(entry.data[1].score_display(), "12-5");
        assert_eq!(entry.data[1].home.name, "Leinster");
        assert_eq!(entry.cached_at, t0());

        let missing = CacheKey::new("2026-02-05", "rugby");
        assert_eq!(cache.merge_live(&missing, &[], &cancel).await.unwrap(), 0);
    }

    #[test]
    fn test_zone_keys_are_separate_buckets() {
        let auckland = key().with_zone(Some(chrono_tz::Pacific::Auckland));
        assert_eq!(auckland.zone.as_deref(), Some("Pacific/Auckland"));
        assert_ne!(auckland, key());
        assert_eq!(auckland.to_string(), "rugby@2026-02-04[Pacific/Auckland]");

        // UTC spelled out is the same bucket as no zone
        assert_eq!(key().with_zone(Some(chrono_tz::UTC)), key());
        assert_eq!(key().with_zone(None), key());
    }
}
