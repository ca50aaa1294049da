//! Outbound matches query.
//!
//! [`MatchService`] is the one object a request surface holds: it resolves
//! the caller's zone and day, picks between local seed data, the live fast
//! path and the read-through cache, and routes upstream matches into the
//! catalog.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::or_empty;
use crate::cache::{CacheKey, MatchCache};
use crate::catalog::CatalogUpserter;
use crate::clock::Clock;
use crate::models::{Match, MatchStatus, PublicationStatus};
use crate::timezone::{day_key_in, effective_zone_name, resolve_zone, DAY_KEY_FORMAT};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid status filter '{0}', expected scheduled, live or final")]
    InvalidStatus(String),

    #[error("A sport is required")]
    MissingSport,
}

impl ServiceError {
    /// Machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidDate(_) => "invalid_date",
            ServiceError::InvalidStatus(_) => "invalid_status",
            ServiceError::MissingSport => "missing_sport",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchQuery {
    /// Calendar day, defaults to today in `tz`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub sport: String,
    #[serde(default)]
    pub status: Option<String>,
    /// IANA zone name. Unresolvable or missing means UTC.
    #[serde(default)]
    pub tz: Option<String>,
    /// Only in-progress matches, straight from the live feed.
    #[serde(default)]
    pub live: bool,
    /// Skip local seed data and always read the upstream.
    #[serde(default)]
    pub external: bool,
}

impl MatchQuery {
    pub fn new(sport: impl Into<String>) -> Self {
        Self {
            sport: sport.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesResponse {
    pub day: String,
    pub timezone: String,
    pub matches: Vec<Match>,
    /// Cold key whose first fetch has not landed yet.
    pub loading: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Locally authored matches served instead of upstream data when present.
#[derive(Debug, Default)]
pub struct LocalMatches {
    matches: RwLock<Vec<Match>>,
}

impl LocalMatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a match by id.
    pub fn upsert(&self, m: Match) {
        let mut matches = self.matches.write().unwrap_or_else(PoisonError::into_inner);
        match matches.iter_mut().find(|existing| existing.id == m.id) {
            Some(existing) => *existing = m,
            None => matches.push(m),
        }
    }

    /// Published matches of `sport` that fall on `day` in `zone`.
    pub fn for_day(&self, day: &str, sport: &str, zone: Option<chrono_tz::Tz>) -> Vec<Match> {
        let matches = self.matches.read().unwrap_or_else(PoisonError::into_inner);
        matches
            .iter()
            .filter(|m| m.tournament.status == PublicationStatus::Published)
            .filter(|m| m.tournament.sport.eq_ignore_ascii_case(sport))
            .filter(|m| day_key_in(m.date, zone) == day)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.matches.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MatchService {
    cache: Arc<MatchCache>,
    catalog: Arc<CatalogUpserter>,
    clock: Arc<dyn Clock>,
    local: LocalMatches,
    /// Fetch time of the last cache entry routed into the catalog, per key.
    ingested: Mutex<HashMap<CacheKey, DateTime<Utc>>>,
}

impl MatchService {
    pub fn new(cache: Arc<MatchCache>, catalog: Arc<CatalogUpserter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            catalog,
            clock,
            local: LocalMatches::new(),
            ingested: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<MatchCache> {
        &self.cache
    }

    pub fn catalog(&self) -> &Arc<CatalogUpserter> {
        &self.catalog
    }

    pub fn local(&self) -> &LocalMatches {
        &self.local
    }

    /// True once per cache entry, so repeated hits on the same fetch do not
    /// re-upsert the catalog.
    fn first_sight(&self, key: &CacheKey, fetched_at: Option<DateTime<Utc>>) -> bool {
        let Some(fetched_at) = fetched_at else {
            return false;
        };
        let mut ingested = self.ingested.lock().unwrap_or_else(PoisonError::into_inner);
        if ingested.get(key) == Some(&fetched_at) {
            return false;
        }
        ingested.insert(key.clone(), fetched_at);
        true
    }

    pub async fn query(
        &self,
        query: &MatchQuery,
        cancel: &CancellationToken,
    ) -> Result<MatchesResponse, ServiceError> {
        let sport = query.sport.trim();
        if sport.is_empty() {
            return Err(ServiceError::MissingSport);
        }
        let status = parse_status(query.status.as_deref())?;

        let zone = resolve_zone(query.tz.as_deref());
        let timezone = effective_zone_name(query.tz.as_deref());
        let day = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => NaiveDate::parse_from_str(raw, DAY_KEY_FORMAT)
                .map_err(|_| ServiceError::InvalidDate(raw.to_string()))?
                .format(DAY_KEY_FORMAT)
                .to_string(),
            None => day_key_in(self.clock.now(), zone),
        };
        let key = CacheKey::new(day.clone(), sport).with_zone(zone);

        let (matches, loading, fetched_at) = if query.live {
            let live = or_empty("live matches", self.cache.fetch_live(sport, cancel).await);
            if let Err(e) = self.cache.merge_live(&key, &live, cancel).await {
                debug!(key = %key, error = %e, "Live results not merged into cache");
            }
            self.catalog.ingest_matches(&live, sport);
            (live, false, Some(self.clock.now()))
        } else {
            let local = if query.external {
                Vec::new()
            } else {
                self.local.for_day(&day, sport, zone)
            };

            if local.is_empty() {
                let read = self.cache.get(&key, cancel).await;
                if self.first_sight(&key, read.fetched_at) {
                    self.catalog.ingest_matches(&read.matches, sport);
                }
                let loading = read.is_loading();
                // The upstream may ignore the zone; keep only matches on the local day
                let on_day = read
                    .matches
                    .into_iter()
                    .filter(|m| day_key_in(m.date, zone) == day)
                    .collect();
                (on_day, loading, read.fetched_at)
            } else {
                debug!(key = %key, count = local.len(), "Serving local matches");
                (local, false, None)
            }
        };

        let mut matches: Vec<Match> = match status {
            Some(status) => matches.into_iter().filter(|m| m.status == status).collect(),
            None => matches,
        };
        matches.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        Ok(MatchesResponse {
            day,
            timezone,
            matches,
            loading,
            fetched_at,
        })
    }

    /// Request boundary: any error becomes a structured error body.
    pub async fn respond(&self, query: &MatchQuery, cancel: &CancellationToken) -> Value {
        match self.query(query, cancel).await {
            Ok(response) => serde_json::to_value(&response)
                .unwrap_or_else(|e| error_body("internal", &e.to_string())),
            Err(e) => {
                warn!(sport = %query.sport, error = %e, "Rejected matches query");
                error_body(e.code(), &e.to_string())
            }
        }
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<MatchStatus>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all")) {
        None => Ok(None),
        Some(raw) => MatchStatus::parse_filter(raw)
            .map(Some)
            .ok_or_else(|| ServiceError::InvalidStatus(raw.to_string())),
    }
}

fn error_body(code: &str, message: &str) -> Value {
    json!({ "error": code, "message": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchResult, MatchFeed};
    use crate::cache::CachePolicy;
    use crate::catalog::CatalogStore;
    use crate::clock::FakeClock;
    use crate::models::{MatchClock, Score, TeamSummary, TournamentSummary};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubFeed {
        day: Vec<Match>,
        live: Vec<Match>,
        day_calls: AtomicUsize,
        live_calls: AtomicUsize,
        day_requests: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl MatchFeed for StubFeed {
        async fn fetch_day(&self, day: &str, sport: &str, zone: Option<&str>) -> FetchResult<Vec<Match>> {
            self.day_calls.fetch_add(1, Ordering::SeqCst);
            self.day_requests
                .lock()
                .unwrap()
                .push(format!("{day}|{sport}|{}", zone.unwrap_or("UTC")));
            Ok(self.day.clone())
        }

        async fn fetch_live(&self, _sport: &str) -> FetchResult<Vec<Match>> {
            self.live_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.live.clone())
        }
    }

    fn rugby_match(id: &str, hour: u32, status: MatchStatus) -> Match {
        Match {
            id: id.to_string(),
            tournament_id: Some("top14".to_string()),
            date: Utc.with_ymd_and_hms(2026, 2, 4, hour, 0, 0).unwrap(),
            status,
            score: Score::default(),
            clock: MatchClock::default(),
            home: TeamSummary {
                id: Some(format!("{id}-h")),
                name: format!("Home {id}"),
                logo: None,
                short_name: None,
            },
            away: TeamSummary {
                id: Some(format!("{id}-a")),
                name: format!("Away {id}"),
                logo: None,
                short_name: None,
            },
            tournament: TournamentSummary {
                id: Some("top14".to_string()),
                name: "Top 14".to_string(),
                sport: "rugby".to_string(),
                status: PublicationStatus::Published,
            },
        }
    }

    fn service(day: Vec<Match>, live: Vec<Match>) -> (Arc<StubFeed>, MatchService) {
        service_at(FakeClock::new(Utc.with_ymd_and_hms(2026, 2, 4, 12, 0, 0).unwrap()), day, live)
    }

    fn service_at(clock: FakeClock, day: Vec<Match>, live: Vec<Match>) -> (Arc<StubFeed>, MatchService) {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let feed = Arc::new(StubFeed {
            day,
            live,
            day_calls: AtomicUsize::new(0),
            live_calls: AtomicUsize::new(0),
            day_requests: StdMutex::new(Vec::new()),
        });
        let cache = Arc::new(MatchCache::new(feed.clone(), clock.clone(), CachePolicy::default()));
        let catalog = Arc::new(CatalogUpserter::new(Arc::new(CatalogStore::new()), clock.clone()));
        (feed, MatchService::new(cache, catalog, clock))
    }

    #[tokio::test]
    async fn test_query_reads_through_cache_and_fills_catalog() {
        let (feed, service) = service(
            vec![rugby_match("b", 18, MatchStatus::Scheduled), rugby_match("a", 15, MatchStatus::Final)],
            vec![],
        );
        let cancel = CancellationToken::new();

        let response = service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        assert_eq!(response.day, "2026-02-04");
        assert_eq!(response.timezone, "UTC");
        assert!(!response.loading);
        let ids: Vec<_> = response.matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        assert_eq!(feed.day_calls.load(Ordering::SeqCst), 1);

        let counts = service.catalog().store().counts();
        assert_eq!(counts.tournaments, 1);
        assert_eq!(counts.clubs, 4);
    }

    #[tokio::test]
    async fn test_status_filter_and_validation() {
        let (_, service) = service(
            vec![rugby_match("a", 15, MatchStatus::Final), rugby_match("b", 18, MatchStatus::Scheduled)],
            vec![],
        );
        let cancel = CancellationToken::new();

        let mut query = MatchQuery::new("rugby");
        query.status = Some("FINAL".to_string());
        let response = service.query(&query, &cancel).await.unwrap();
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].id, "a");

        query.status = Some("postponed".to_string());
        let err = service.query(&query, &cancel).await.unwrap_err();
        assert_eq!(err.code(), "invalid_status");

        let mut bad_date = MatchQuery::new("rugby");
        bad_date.date = Some("04/02/2026".to_string());
        assert!(matches!(
            service.query(&bad_date, &cancel).await,
            Err(ServiceError::InvalidDate(_))
        ));

        assert!(matches!(
            service.query(&MatchQuery::new("  "), &cancel).await,
            Err(ServiceError::MissingSport)
        ));
    }

    #[tokio::test]
    async fn test_timezone_shifts_default_day_and_degrades_to_utc() {
        let (_, service) = service(vec![], vec![]);
        let cancel = CancellationToken::new();

        let mut query = MatchQuery::new("rugby");
        query.tz = Some("Pacific/Auckland".to_string());
        let response = service.query(&query, &cancel).await.unwrap();
        assert_eq!(response.day, "2026-02-05");
        assert_eq!(response.timezone, "Pacific/Auckland");

        query.tz = Some("Not/A_Zone".to_string());
        let response = service.query(&query, &cancel).await.unwrap();
        assert_eq!(response.day, "2026-02-04");
        assert_eq!(response.timezone, "UTC");

        query.tz = Some("Asia/Calcutta".to_string());
        let response = service.query(&query, &cancel).await.unwrap();
        assert_eq!(response.timezone, "Asia/Kolkata");
    }

    #[tokio::test]
    async fn test_local_matches_win_unless_external() {
        let (feed, service) = service(vec![rugby_match("upstream", 15, MatchStatus::Scheduled)], vec![]);
        service.local().upsert(rugby_match("seed", 14, MatchStatus::Scheduled));
        let cancel = CancellationToken::new();

        let response = service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        assert_eq!(response.matches[0].id, "seed");
        assert_eq!(feed.day_calls.load(Ordering::SeqCst), 0);

        let mut external = MatchQuery::new("rugby");
        external.external = true;
        let response = service.query(&external, &cancel).await.unwrap();
        assert_eq!(response.matches[0].id, "upstream");
        assert_eq!(feed.day_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_fast_path_skips_day_fetch() {
        let mut live = rugby_match("a", 15, MatchStatus::Live);
        live.score = Score { home: Some(7), away: Some(3) };
        let (feed, service) = service(vec![], vec![live]);

        let mut query = MatchQuery::new("rugby");
        query.live = true;
        let response = service.query(&query, &CancellationToken::new()).await.unwrap();

        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].score.home, Some(7));
        assert_eq!(feed.live_calls.load(Ordering::SeqCst), 1);
        assert_eq!(feed.day_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_respond_turns_errors_into_body() {
        let (_, service) = service(vec![], vec![]);
        let mut query = MatchQuery::new("rugby");
        query.date = Some("tomorrow".to_string());

        let body = service.respond(&query, &CancellationToken::new()).await;
        assert_eq!(body["error"], "invalid_date");
        assert!(body["message"].as_str().unwrap().contains("tomorrow"));

        let ok = service.respond(&MatchQuery::new("rugby"), &CancellationToken::new()).await;
        assert_eq!(ok["day"], "2026-02-04");
        assert_eq!(ok["loading"], false);
    }

    #[tokio::test]
    async fn test_zone_reaches_upstream_and_bounds_the_local_day() {
        let mut same_day = rugby_match("same-day", 0, MatchStatus::Scheduled);
        same_day.date = Utc.with_ymd_and_hms(2026, 2, 5, 5, 0, 0).unwrap();
        let mut next_day = rugby_match("next-day", 0, MatchStatus::Scheduled);
        next_day.date = Utc.with_ymd_and_hms(2026, 2, 5, 20, 0, 0).unwrap();
        let (feed, service) = service(vec![same_day, next_day], vec![]);
        let cancel = CancellationToken::new();

        let mut query = MatchQuery::new("rugby");
        query.date = Some("2026-02-05".to_string());
        query.tz = Some("Pacific/Auckland".to_string());
        let response = service.query(&query, &cancel).await.unwrap();

        // 20:00Z on the 5th is already the 6th in Auckland
        let ids: Vec<_> = response.matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["same-day"]);
        assert_eq!(
            feed.day_requests.lock().unwrap().as_slice(),
            &["2026-02-05|rugby|Pacific/Auckland".to_string()]
        );

        // The legacy alias lands on the same bucket
        query.tz = Some("NZ".to_string());
        service.query(&query, &cancel).await.unwrap();
        assert_eq!(feed.day_calls.load(Ordering::SeqCst), 1);

        // The UTC bucket for the same date is separate and keeps both matches
        query.tz = None;
        let response = service.query(&query, &cancel).await.unwrap();
        assert_eq!(response.matches.len(), 2);
        assert_eq!(feed.day_requests.lock().unwrap()[1], "2026-02-05|rugby|UTC");
    }

    #[tokio::test]
    async fn test_catalog_ingests_each_cache_entry_once() {
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2026, 2, 4, 12, 0, 0).unwrap());
        let (feed, service) = service_at(clock.clone(), vec![rugby_match("a", 15, MatchStatus::Scheduled)], vec![]);
        let cancel = CancellationToken::new();
        let updated_at = |service: &MatchService| service.catalog().store().tournament("top14").unwrap().updated_at;

        service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        let first = updated_at(&service);

        // Fresh hit: same cache entry, no new upstream observation
        clock.advance(chrono::Duration::seconds(60));
        service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        assert_eq!(updated_at(&service), first);

        // Stale hit starts a refresh; the next read sees the new entry
        clock.advance(chrono::Duration::seconds(120));
        service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        let key = CacheKey::new("2026-02-04", "rugby");
        for _ in 0..100 {
            if feed.day_calls.load(Ordering::SeqCst) == 2 && !service.cache().refresh_in_flight(&key).await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(updated_at(&service), first);
        service.query(&MatchQuery::new("rugby"), &cancel).await.unwrap();
        assert_eq!(updated_at(&service), clock.now());
    }
}
