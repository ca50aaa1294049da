//! HTTP client for the upstream sports-results feed.
//!
//! `FeedClient` fetches day and live match lists and tournament-detail
//! payloads, detects each payload's shape and normalizes match rows into
//! canonical [`Match`] records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::models::{FeedPayload, Match};

use super::{ApiError, FetchResult, MatchFeed};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the provider API key
const API_KEY_HEADER: &str = "x-api-key";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Feed client. Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &SyncConfig) -> FetchResult<Self> {
        Self::new(
            config.feed_base_url.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        )
    }

    fn headers(&self) -> FetchResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            let value = header::HeaderValue::from_str(key)
                .map_err(|e| ApiError::InvalidResponse(format!("Invalid API key header: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }

    /// Check if response is successful.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: reqwest::Response) -> FetchResult<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> FetchResult<Value> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.headers()?)
                .query(query)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!("Malformed JSON from {}: {}", url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get_matches(&self, url: &str, query: &[(&str, &str)], sport: &str) -> FetchResult<Vec<Match>> {
        let body = self.get_json(url, query).await?;
        let payload = FeedPayload::detect(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Unrecognized match payload: {}", e)))?;
        let matches = payload.into_matches(sport);
        debug!(url = url, sport = sport, count = matches.len(), "Fetched matches");
        Ok(matches)
    }

    /// Raw tournament-detail payload for one view (`standings`, `fixtures`,
    /// `results`, `top-scorers`), or the whole detail when `view` is `None`.
    pub async fn fetch_tournament_detail(&self, tournament_id: &str, view: Option<&str>) -> FetchResult<Value> {
        let url = match view {
            Some(view) => format!("{}/tournaments/{}/{}", self.base_url, tournament_id, view),
            None => format!("{}/tournaments/{}", self.base_url, tournament_id),
        };
        self.get_json(&url, &[]).await
    }
}

fn day_query<'a>(day: &'a str, sport: &'a str, zone: Option<&'a str>) -> Vec<(&'a str, &'a str)> {
    let mut query = vec![("date", day), ("sport", sport)];
    if let Some(zone) = zone {
        query.push(("timezone", zone));
    }
    query
}

#[async_trait]
impl MatchFeed for FeedClient {
    async fn fetch_day(&self, day: &str, sport: &str, zone: Option<&str>) -> FetchResult<Vec<Match>> {
        let url = format!("{}/matches", self.base_url);
        self.get_matches(&url, &day_query(day, sport, zone), sport).await
    }

    async fn fetch_live(&self, sport: &str) -> FetchResult<Vec<Match>> {
        let url = format!("{}/matches/live", self.base_url);
        self.get_matches(&url, &[("sport", sport)], sport).await
    }
}
