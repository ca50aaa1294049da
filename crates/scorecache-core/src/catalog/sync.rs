//! Tournament-detail sync: snapshot first, catalog second.
//!
//! Each view payload is captured in the [`TabSnapshotStore`] before any
//! catalog work. A capture that reports no change skips the upserts, so
//! re-fetching an unchanged tab costs one hash.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiError, FetchResult};
use crate::models::{FeedPayload, TournamentDetail};
use crate::snapshot::{SnapshotKey, TabSnapshot, TabSnapshotStore};

use super::{CatalogUpserter, IngestSummary};

/// View name for a whole tournament-detail payload.
pub const OVERVIEW_VIEW: &str = "overview";

const TOURNAMENT_ENTITY: &str = "tournament";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailSyncReport {
    pub key: SnapshotKey,
    pub changed: bool,
    pub content_hash: String,
    /// `None` when the payload matched the stored snapshot and nothing was upserted.
    pub summary: Option<IngestSummary>,
}

/// How a view's payload reaches the catalog.
enum ViewIngest {
    Standings,
    TopScorers,
    Matches(FeedPayload),
    Detail,
}

impl ViewIngest {
    fn for_view(view: &str, payload: &Value) -> FetchResult<Self> {
        Ok(match view {
            "standings" | "table" => ViewIngest::Standings,
            "top-scorers" | "scorers" | "leaders" => ViewIngest::TopScorers,
            "fixtures" | "results" => {
                let detected = FeedPayload::detect(payload.clone()).map_err(|e| {
                    ApiError::InvalidResponse(format!("Unreadable {} payload: {}", view, e))
                })?;
                ViewIngest::Matches(detected)
            }
            _ => ViewIngest::Detail,
        })
    }
}

pub struct DetailSync {
    upserter: Arc<CatalogUpserter>,
    snapshots: Arc<TabSnapshotStore>,
}

impl DetailSync {
    pub fn new(upserter: Arc<CatalogUpserter>, snapshots: Arc<TabSnapshotStore>) -> Self {
        Self { upserter, snapshots }
    }

    pub fn upserter(&self) -> &Arc<CatalogUpserter> {
        &self.upserter
    }

    pub fn snapshots(&self) -> &Arc<TabSnapshotStore> {
        &self.snapshots
    }

    /// Snapshot key for one tournament view. The payload's own tournament
    /// id wins over `fallback_id`; a missing view means the whole detail.
    pub fn key_for(payload: &Value, fallback_id: &str, view: Option<&str>) -> SnapshotKey {
        let entity_id = TournamentDetail::from_value(payload)
            .tournament
            .and_then(|t| t.id)
            .unwrap_or_else(|| fallback_id.to_string());
        SnapshotKey::new(TOURNAMENT_ENTITY, entity_id, view.unwrap_or(OVERVIEW_VIEW))
    }

    /// Capture `payload` under `key` and upsert it into the catalog only
    /// when the capture reports a change.
    ///
    /// A payload whose shape cannot be read for its view is rejected before
    /// capture, so it never becomes the stored snapshot.
    pub fn sync(
        &self,
        key: SnapshotKey,
        payload: Value,
        sport: &str,
        source_version: Option<String>,
    ) -> FetchResult<DetailSyncReport> {
        let ingest = ViewIngest::for_view(&key.view, &payload)?;
        let capture = self.snapshots.capture(key.clone(), payload, source_version);

        let summary = if capture.changed {
            let payload = &capture.snapshot.payload;
            Some(match ingest {
                ViewIngest::Standings => self.upserter.ingest_standings(payload, None, sport),
                ViewIngest::TopScorers => self.upserter.ingest_top_scorers(payload, None, sport),
                ViewIngest::Matches(detected) => self.upserter.ingest_feed(detected, sport),
                ViewIngest::Detail => self.upserter.ingest_tournament_detail(payload, sport),
            })
        } else {
            debug!(key = %key, "Snapshot unchanged, skipping catalog ingest");
            None
        };

        Ok(DetailSyncReport {
            key,
            changed: capture.changed,
            content_hash: capture.snapshot.content_hash,
            summary,
        })
    }

    /// A fetch for `key` failed; the stored snapshot and catalog stay as they are.
    pub fn record_failure(&self, key: &SnapshotKey, reason: impl Into<String>) -> Option<TabSnapshot> {
        self.snapshots.record_failure(key, reason)
    }
}
