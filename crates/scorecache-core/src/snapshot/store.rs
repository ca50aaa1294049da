//! Per-(entity, view) snapshots of raw upstream payloads.
//!
//! [`TabSnapshotStore::capture`] reports whether a freshly fetched payload
//! differs from the last one stored under its key, so callers can skip
//! downstream work when nothing changed.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::canonical::content_hash;
use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotKey {
    pub entity_type: String,
    pub entity_id: String,
    pub view: String,
}

impl SnapshotKey {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        view: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            view: view.into(),
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.entity_type, self.entity_id, self.view)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum FetchOutcome {
    Ok,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub payload: Value,
    pub content_hash: String,
    pub source_version: Option<String>,
    /// Advances on every capture attempt.
    pub last_fetched_at: DateTime<Utc>,
    /// Advances only when the hash or version differs from what was stored.
    pub last_changed_at: DateTime<Utc>,
    pub last_outcome: FetchOutcome,
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub changed: bool,
    pub snapshot: TabSnapshot,
}

pub struct TabSnapshotStore {
    entries: RwLock<HashMap<SnapshotKey, TabSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl TabSnapshotStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Store `payload` under `key` if it differs from the stored snapshot.
    ///
    /// A version marker is compared only when one is supplied. A capture
    /// without a marker keeps whatever marker was stored.
    pub fn capture(
        &self,
        key: SnapshotKey,
        payload: Value,
        source_version: Option<String>,
    ) -> CaptureResult {
        let hash = content_hash(&payload);
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let Some(existing) = entries.get_mut(&key) else {
            debug!(key = %key, "First snapshot");
            let snapshot = TabSnapshot {
                payload,
                content_hash: hash,
                source_version,
                last_fetched_at: now,
                last_changed_at: now,
                last_outcome: FetchOutcome::Ok,
            };
            entries.insert(key, snapshot.clone());
            return CaptureResult { changed: true, snapshot };
        };

        let version_changed = source_version
            .as_ref()
            .is_some_and(|v| existing.source_version.as_ref() != Some(v));
        let changed = existing.content_hash != hash || version_changed;

        existing.last_fetched_at = now;
        existing.last_outcome = FetchOutcome::Ok;
        if changed {
            debug!(key = %key, "Snapshot changed");
            existing.payload = payload;
            existing.content_hash = hash;
            if source_version.is_some() {
                existing.source_version = source_version;
            }
            existing.last_changed_at = now;
        }

        CaptureResult {
            changed,
            snapshot: existing.clone(),
        }
    }

    /// Record a failed fetch for `key`. The stored payload is left alone.
    /// Returns `None` when nothing was ever captured under the key.
    pub fn record_failure(&self, key: &SnapshotKey, reason: impl Into<String>) -> Option<TabSnapshot> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let existing = entries.get_mut(key)?;
        existing.last_fetched_at = self.clock.now();
        existing.last_outcome = FetchOutcome::Failed(reason.into());
        Some(existing.clone())
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<TabSnapshot> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
