use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of upstream payload an entity was last observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    MatchFeed,
    Standings,
    TopScorers,
    TournamentDetail,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::MatchFeed => write!(f, "match_feed"),
            Provenance::Standings => write!(f, "standings"),
            Provenance::TopScorers => write!(f, "top_scorers"),
            Provenance::TournamentDetail => write!(f, "tournament_detail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTournament {
    pub id: String,
    pub name: String,
    pub sport: Option<String>,
    pub country: Option<String>,
    pub logo: Option<String>,
    pub source: Provenance,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogClub {
    pub id: String,
    pub name: String,
    pub short_name: Option<String>,
    pub logo: Option<String>,
    pub country: Option<String>,
    /// Every sport this club has been observed in. Only ever grows.
    pub sports: BTreeSet<String>,
    pub source: Provenance,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPlayer {
    pub id: String,
    pub name: String,
    pub team_id: Option<String>,
    pub team_name: Option<String>,
    pub position: Option<String>,
    pub nationality: Option<String>,
    pub photo: Option<String>,
    pub sport: Option<String>,
    /// Set for athletes in individual sports, where no team could be derived.
    pub is_individual: bool,
    pub source: Provenance,
    pub updated_at: DateTime<Utc>,
}
