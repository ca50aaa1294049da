//! Canonical match shape served to consumers.
//!
//! Every upstream variant is normalized into [`Match`] before it reaches
//! the cache, so the poller and prefetcher only ever merge one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Scheduled,
    Live,
    Final,
}

impl MatchStatus {
    /// Map an upstream status label onto the canonical status.
    /// Labels differ per sport, so anything unrecognized is treated as scheduled.
    pub fn from_upstream(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        match lower.as_str() {
            "live" | "inprogress" | "in_progress" | "in progress" | "playing" | "1h" | "2h"
            | "ht" | "halftime" | "et" | "bt" | "p" | "pen" | "break" | "interrupted"
            | "started" => MatchStatus::Live,
            "final" | "finished" | "ft" | "aet" | "ap" | "ended" | "complete" | "completed"
            | "fulltime" | "full_time" | "closed" => MatchStatus::Final,
            _ if lower.starts_with("period") || lower.starts_with("quarter") => MatchStatus::Live,
            _ => MatchStatus::Scheduled,
        }
    }

    /// Parse the `status` filter of a matches query. Only canonical names are accepted.
    pub fn parse_filter(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Some(MatchStatus::Scheduled),
            "live" => Some(MatchStatus::Live),
            "final" => Some(MatchStatus::Final),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Scheduled => write!(f, "scheduled"),
            MatchStatus::Live => write!(f, "live"),
            MatchStatus::Final => write!(f, "final"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchClock {
    pub running: bool,
    pub elapsed_seconds: Option<u32>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: Option<String>,
    pub name: String,
    pub logo: Option<String>,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    #[default]
    Published,
    Draft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSummary {
    pub id: Option<String>,
    pub name: String,
    pub sport: String,
    pub status: PublicationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub tournament_id: Option<String>,
    pub date: DateTime<Utc>,
    pub status: MatchStatus,
    pub score: Score,
    pub clock: MatchClock,
    pub home: TeamSummary,
    pub away: TeamSummary,
    pub tournament: TournamentSummary,
}

impl Match {
    /// Overwrite the fields that change while a match is in progress.
    /// Identity, teams, kickoff and tournament stay as they were.
    pub fn merge_live(&mut self, live: &Match) {
        self.status = live.status;
        self.score = live.score;
        self.clock = live.clock.clone();
    }

    pub fn is_live(&self) -> bool {
        self.status == MatchStatus::Live
    }

    /// Compact score for list views: "21-14", or "-" before kickoff.
    pub fn score_display(&self) -> String {
        match (self.score.home, self.score.away) {
            (Some(h), Some(a)) => format!("{}-{}", h, a),
            _ => "-".to_string(),
        }
    }
}
