//! In-memory catalog of tournaments, clubs and players.
//!
//! Every upsert is a read-modify-write under the write lock of its kind's
//! map, so two observations of the same id never interleave.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::models::{CatalogClub, CatalogPlayer, CatalogTournament};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub tournaments: usize,
    pub clubs: usize,
    pub players: usize,
}

#[derive(Debug, Default)]
pub struct CatalogStore {
    tournaments: RwLock<HashMap<String, CatalogTournament>>,
    clubs: RwLock<HashMap<String, CatalogClub>>,
    players: RwLock<HashMap<String, CatalogPlayer>>,
}

/// Overwrite `slot` only when the observation carries a value.
fn take_some<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// An empty incoming name means the observation had only an id.
fn take_name(slot: &mut String, incoming: String) {
    if !incoming.is_empty() {
        *slot = incoming;
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a tournament, returning the stored record.
    pub fn upsert_tournament(&self, mut incoming: CatalogTournament) -> CatalogTournament {
        let mut map = self.tournaments.write().unwrap_or_else(PoisonError::into_inner);
        match map.get_mut(&incoming.id) {
            Some(existing) => {
                take_name(&mut existing.name, incoming.name);
                take_some(&mut existing.sport, incoming.sport);
                take_some(&mut existing.country, incoming.country);
                take_some(&mut existing.logo, incoming.logo);
                existing.source = incoming.source;
                existing.updated_at = incoming.updated_at;
                existing.clone()
            }
            None => {
                if incoming.name.is_empty() {
                    incoming.name = incoming.id.clone();
                }
                map.insert(incoming.id.clone(), incoming.clone());
                incoming
            }
        }
    }

    /// Insert or merge a club. The sport set is unioned with what is stored.
    pub fn upsert_club(&self, mut incoming: CatalogClub) -> CatalogClub {
        let mut map = self.clubs.write().unwrap_or_else(PoisonError::into_inner);
        match map.get_mut(&incoming.id) {
            Some(existing) => {
                take_name(&mut existing.name, incoming.name);
                take_some(&mut existing.short_name, incoming.short_name);
                take_some(&mut existing.logo, incoming.logo);
                take_some(&mut existing.country, incoming.country);
                existing.sports.extend(incoming.sports);
                existing.source = incoming.source;
                existing.updated_at = incoming.updated_at;
                existing.clone()
            }
            None => {
                if incoming.name.is_empty() {
                    incoming.name = incoming.id.clone();
                }
                map.insert(incoming.id.clone(), incoming.clone());
                incoming
            }
        }
    }

    /// Insert or merge a player. `is_individual` is recomputed on the merged record.
    pub fn upsert_player(&self, mut incoming: CatalogPlayer) -> CatalogPlayer {
        let mut map = self.players.write().unwrap_or_else(PoisonError::into_inner);
        let merged = match map.entry(incoming.id.clone()) {
            Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                take_name(&mut existing.name, incoming.name);
                take_some(&mut existing.team_id, incoming.team_id);
                take_some(&mut existing.team_name, incoming.team_name);
                take_some(&mut existing.position, incoming.position);
                take_some(&mut existing.nationality, incoming.nationality);
                take_some(&mut existing.photo, incoming.photo);
                take_some(&mut existing.sport, incoming.sport);
                existing.source = incoming.source;
                existing.updated_at = incoming.updated_at;
                existing
            }
            Entry::Vacant(entry) => {
                if incoming.name.is_empty() {
                    incoming.name = incoming.id.clone();
                }
                entry.insert(incoming)
            }
        };
        merged.is_individual = merged.team_id.is_none() && merged.team_name.is_none();
        merged.clone()
    }

    pub fn tournament(&self, id: &str) -> Option<CatalogTournament> {
        let map = self.tournaments.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned()
    }

    pub fn club(&self, id: &str) -> Option<CatalogClub> {
        let map = self.clubs.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned()
    }

    pub fn player(&self, id: &str) -> Option<CatalogPlayer> {
        let map = self.players.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned()
    }

    /// All tournaments, sorted by name then id.
    pub fn tournaments(&self) -> Vec<CatalogTournament> {
        let map = self.tournaments.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// All clubs, sorted by name then id.
    pub fn clubs(&self) -> Vec<CatalogClub> {
        let map = self.clubs.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// All players, sorted by name then id.
    pub fn players(&self) -> Vec<CatalogPlayer> {
        let map = self.players.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn counts(&self) -> CatalogCounts {
        CatalogCounts {
            tournaments: self.tournaments.read().unwrap_or_else(PoisonError::into_inner).len(),
            clubs: self.clubs.read().unwrap_or_else(PoisonError::into_inner).len(),
            players: self.players.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }
}
