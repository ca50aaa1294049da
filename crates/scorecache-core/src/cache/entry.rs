use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A fetched value and the instant it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }

    /// Stale once strictly older than `ttl`; an entry exactly `ttl` old is still fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: std::time::Duration) -> bool {
        match Duration::from_std(ttl) {
            Ok(ttl) => self.age(now) > ttl,
            Err(_) => false,
        }
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age(now).num_minutes();
        if minutes < 1 {
            // Covers clock skew too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}
