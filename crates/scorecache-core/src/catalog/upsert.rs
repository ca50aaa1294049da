//! Normalizes upstream payloads into catalog upserts.
//!
//! Accepts flat and tournament-grouped match lists, canonical matches,
//! standings, top scorers and whole tournament-detail payloads. Records that
//! carry neither an id nor a usable name are counted as skipped.

use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::ids::{derive_id, EntityKind};
use super::store::CatalogStore;
use crate::clock::Clock;
use crate::models::feed::UNKNOWN_TEAM;
use crate::models::{
    rows_of, CatalogClub, CatalogPlayer, CatalogTournament, FeedPayload, Match,
    MatchObservation, Provenance, RawTeam, RawTournament, ScorerRow, Side, StandingRow,
    TournamentDetail,
};

/// Upserts performed by one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub tournaments: usize,
    pub clubs: usize,
    pub players: usize,
    pub skipped: usize,
}

impl IngestSummary {
    pub fn total(&self) -> usize {
        self.tournaments + self.clubs + self.players
    }
}

impl AddAssign for IngestSummary {
    fn add_assign(&mut self, other: Self) {
        self.tournaments += other.tournaments;
        self.clubs += other.clubs;
        self.players += other.players;
        self.skipped += other.skipped;
    }
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Team name, ignoring the placeholder used for unnamed sides.
fn named_team(team: &RawTeam) -> Option<&str> {
    clean(team.name.as_deref()).filter(|name| *name != UNKNOWN_TEAM)
}

pub struct CatalogUpserter {
    store: Arc<CatalogStore>,
    clock: Arc<dyn Clock>,
}

impl CatalogUpserter {
    pub fn new(store: Arc<CatalogStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    /// Ingest a detected match payload, flat or grouped.
    pub fn ingest_feed(&self, payload: FeedPayload, sport: &str) -> IngestSummary {
        self.ingest_observations(&payload.into_observations(), sport)
    }

    pub fn ingest_observations(&self, observations: &[MatchObservation], sport: &str) -> IngestSummary {
        self.observe_matches(observations, sport, Provenance::MatchFeed)
    }

    /// Ingest already-normalized matches, as served by the cache.
    pub fn ingest_matches(&self, matches: &[Match], sport: &str) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for m in matches {
            let tournament = RawTournament {
                id: m.tournament.id.clone().or_else(|| m.tournament_id.clone()),
                name: Some(m.tournament.name.clone()),
                sport: Some(m.tournament.sport.clone()),
                ..RawTournament::default()
            };
            self.upsert_tournament(&tournament, sport, Provenance::MatchFeed, &mut summary);

            for team in [&m.home, &m.away] {
                let raw = RawTeam {
                    id: team.id.clone(),
                    name: Some(team.name.clone()),
                    short_name: team.short_name.clone(),
                    logo: team.logo.clone(),
                    country: None,
                };
                self.upsert_club(&raw, sport, Provenance::MatchFeed, &mut summary);
            }
        }
        summary
    }

    /// Standings rows become clubs. The owning tournament is upserted when given.
    pub fn ingest_standings(
        &self,
        value: &Value,
        tournament: Option<&RawTournament>,
        sport: &str,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();
        if let Some(tournament) = tournament {
            self.upsert_tournament(tournament, sport, Provenance::Standings, &mut summary);
        }
        for row in rows_of::<StandingRow>(value) {
            self.upsert_club(&row.team(), sport, Provenance::Standings, &mut summary);
        }
        summary
    }

    /// Scorer rows become players, plus a club for each team they name.
    pub fn ingest_top_scorers(
        &self,
        value: &Value,
        tournament: Option<&RawTournament>,
        sport: &str,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();
        if let Some(tournament) = tournament {
            self.upsert_tournament(tournament, sport, Provenance::TopScorers, &mut summary);
        }
        for row in rows_of::<ScorerRow>(value) {
            self.upsert_scorer(&row, sport, &mut summary);
        }
        summary
    }

    /// Ingest a whole tournament-detail payload: the tournament, its
    /// standings, top scorers, fixtures and results.
    pub fn ingest_tournament_detail(&self, value: &Value, sport: &str) -> IngestSummary {
        let detail = TournamentDetail::from_value(value);
        let tournament = detail.tournament.clone().or_else(|| bare_tournament(value));
        let sport = tournament
            .as_ref()
            .and_then(|t| clean(t.sport.as_deref()))
            .unwrap_or(sport);

        let mut summary = IngestSummary::default();
        if let Some(tournament) = &tournament {
            self.upsert_tournament(tournament, sport, Provenance::TournamentDetail, &mut summary);
        }
        if let Some(standings) = &detail.standings {
            summary += self.ingest_standings(standings, None, sport);
        }
        if let Some(scorers) = &detail.top_scorers {
            summary += self.ingest_top_scorers(scorers, None, sport);
        }
        for matches in [&detail.fixtures, &detail.results].into_iter().flatten() {
            let payload = match FeedPayload::detect(matches.clone()) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable detail match list");
                    continue;
                }
            };
            let mut observations = payload.into_observations();
            for obs in &mut observations {
                if obs.context.is_none() {
                    obs.context = tournament.clone();
                }
            }
            summary += self.observe_matches(&observations, sport, Provenance::TournamentDetail);
        }

        info!(
            sport = sport,
            tournaments = summary.tournaments,
            clubs = summary.clubs,
            players = summary.players,
            skipped = summary.skipped,
            "Ingested tournament detail"
        );
        summary
    }

    fn observe_matches(
        &self,
        observations: &[MatchObservation],
        sport: &str,
        source: Provenance,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();
        for obs in observations {
            if let Some(tournament) = obs.tournament() {
                self.upsert_tournament(&tournament, sport, source, &mut summary);
            }
            for side in [Side::Home, Side::Away] {
                self.upsert_club(&obs.raw.team(side), sport, source, &mut summary);
            }
        }
        summary
    }

    fn upsert_tournament(
        &self,
        raw: &RawTournament,
        sport: &str,
        source: Provenance,
        summary: &mut IngestSummary,
    ) -> Option<String> {
        let name = clean(raw.name.as_deref());
        let Some(id) = derive_id(EntityKind::Tournament, raw.id.as_deref(), name) else {
            debug!(sport = sport, "Skipping tournament without id or name");
            summary.skipped += 1;
            return None;
        };

        let stored = self.store.upsert_tournament(CatalogTournament {
            id,
            name: name.unwrap_or_default().to_string(),
            sport: clean(raw.sport.as_deref()).or(clean(Some(sport))).map(str::to_string),
            country: raw.country.clone(),
            logo: raw.logo.clone(),
            source,
            updated_at: self.clock.now(),
        });
        summary.tournaments += 1;
        Some(stored.id)
    }

    fn upsert_club(
        &self,
        raw: &RawTeam,
        sport: &str,
        source: Provenance,
        summary: &mut IngestSummary,
    ) -> Option<String> {
        let name = named_team(raw);
        let Some(id) = derive_id(EntityKind::Club, raw.id.as_deref(), name) else {
            debug!(sport = sport, "Skipping club without id or name");
            summary.skipped += 1;
            return None;
        };

        let sports: BTreeSet<String> = clean(Some(sport)).map(str::to_string).into_iter().collect();
        let stored = self.store.upsert_club(CatalogClub {
            id,
            name: name.unwrap_or_default().to_string(),
            short_name: raw.short_name.clone(),
            logo: raw.logo.clone(),
            country: raw.country.clone(),
            sports,
            source,
            updated_at: self.clock.now(),
        });
        summary.clubs += 1;
        Some(stored.id)
    }

    fn upsert_scorer(&self, row: &ScorerRow, sport: &str, summary: &mut IngestSummary) {
        let player = row.player();
        let name = clean(player.name.as_deref());
        let Some(id) = derive_id(EntityKind::Player, player.id.as_deref(), name) else {
            debug!(sport = sport, "Skipping player without id or name");
            summary.skipped += 1;
            return;
        };

        let team = row.team();
        let team_id = team
            .as_ref()
            .and_then(|team| self.upsert_club(team, sport, Provenance::TopScorers, summary));
        let team_name = team
            .as_ref()
            .and_then(named_team)
            .map(str::to_string);

        self.store.upsert_player(CatalogPlayer {
            id,
            name: name.unwrap_or_default().to_string(),
            is_individual: team_id.is_none() && team_name.is_none(),
            team_id,
            team_name,
            position: player.position,
            nationality: player.nationality,
            photo: player.photo,
            sport: clean(Some(sport)).map(str::to_string),
            source: Provenance::TopScorers,
            updated_at: self.clock.now(),
        });
        summary.players += 1;
    }
}

/// A detail payload that is itself the tournament object.
fn bare_tournament(value: &Value) -> Option<RawTournament> {
    if value.get("id").is_none() && value.get("name").is_none() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}
