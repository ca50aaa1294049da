//! Data models for the sports-results feed.
//!
//! This module contains the data structures used across the crate:
//!
//! - `Match` and its parts: the canonical shape served to consumers
//! - `FeedPayload`, `RawMatch`: upstream match payloads with aliased fields
//! - `TournamentDetail`, `StandingRow`, `ScorerRow`: aggregate detail payloads
//! - `CatalogTournament`, `CatalogClub`, `CatalogPlayer`: deduplicated catalog entities

pub mod catalog;
pub mod detail;
pub mod feed;
pub mod matches;

pub use catalog::{CatalogClub, CatalogPlayer, CatalogTournament, Provenance};
pub use detail::{rows_of, RawPlayer, ScorerRow, StandingRow, TournamentDetail};
pub use feed::{FeedPayload, MatchObservation, RawMatch, RawTeam, RawTournament, Side, TournamentGroup};
pub use matches::{
    Match, MatchClock, MatchStatus, PublicationStatus, Score, TeamSummary, TournamentSummary,
};
