//! Aggregate tournament-detail payloads: standings and top scorers.
//!
//! Both arrive either as a flat row list or as a list of groups (pools,
//! conferences) each holding rows. [`rows_of`] flattens either form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::feed::{string_or_number, RawTeam, RawTournament};

/// Keys under which a group nests its rows.
const GROUP_ROW_KEYS: &[&str] = &["rows", "standings", "table", "entries", "players", "scorers"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingRow {
    #[serde(default, alias = "club", alias = "participant", alias = "competitor")]
    pub team: Option<RawTeam>,
    #[serde(default, rename = "teamId", deserialize_with = "string_or_number")]
    pub team_id: Option<String>,
    #[serde(default, rename = "teamName")]
    pub team_name: Option<String>,
    #[serde(default, alias = "rank")]
    pub position: Option<u32>,
    #[serde(default, alias = "pts")]
    pub points: Option<i32>,
}

impl StandingRow {
    pub fn team(&self) -> RawTeam {
        let mut team = self.team.clone().unwrap_or_default();
        if team.id.is_none() {
            team.id = self.team_id.clone();
        }
        if team.name.is_none() {
            team.name = self.team_name.clone();
        }
        team
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlayer {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "fullName", alias = "displayName", alias = "playerName")]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default, alias = "country")]
    pub nationality: Option<String>,
    #[serde(default, alias = "image", alias = "headshot")]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScorerRow {
    #[serde(default, alias = "athlete")]
    pub player: Option<RawPlayer>,
    #[serde(default, rename = "playerId", deserialize_with = "string_or_number")]
    pub player_id: Option<String>,
    #[serde(default, rename = "playerName")]
    pub player_name: Option<String>,
    #[serde(default, alias = "club")]
    pub team: Option<RawTeam>,
    #[serde(default, rename = "teamId", deserialize_with = "string_or_number")]
    pub team_id: Option<String>,
    #[serde(default, rename = "teamName")]
    pub team_name: Option<String>,
    #[serde(default, alias = "tries", alias = "points")]
    pub goals: Option<u32>,
}

impl ScorerRow {
    pub fn player(&self) -> RawPlayer {
        let mut player = self.player.clone().unwrap_or_default();
        if player.id.is_none() {
            player.id = self.player_id.clone();
        }
        if player.name.is_none() {
            player.name = self.player_name.clone();
        }
        player
    }

    /// Team the scorer played for. `None` when neither an id nor a name is present.
    pub fn team(&self) -> Option<RawTeam> {
        let mut team = self.team.clone().unwrap_or_default();
        if team.id.is_none() {
            team.id = self.team_id.clone();
        }
        if team.name.is_none() {
            team.name = self.team_name.clone();
        }
        if team.id.is_none() && team.name.is_none() {
            None
        } else {
            Some(team)
        }
    }
}

/// Parse a standings or top-scorers value into rows, flattening groups.
pub fn rows_of<T: serde::de::DeserializeOwned>(value: &Value) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => {
            match GROUP_ROW_KEYS.iter().find_map(|k| map.get(*k).and_then(Value::as_array)) {
                Some(items) => items.as_slice(),
                None => return Vec::new(),
            }
        }
        _ => return Vec::new(),
    };

    let mut rows = Vec::new();
    for item in items {
        let nested = GROUP_ROW_KEYS
            .iter()
            .find_map(|k| item.get(*k).and_then(Value::as_array));
        match nested {
            Some(group_rows) => {
                rows.extend(group_rows.iter().filter_map(|r| parse_row::<T>(r)));
            }
            None => rows.extend(parse_row::<T>(item)),
        }
    }
    rows
}

fn parse_row<T: serde::de::DeserializeOwned>(value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(row) => Some(row),
        Err(e) => {
            debug!(error = %e, "Skipping malformed detail row");
            None
        }
    }
}

/// A full tournament-detail payload: the tournament itself plus any of its views.
#[derive(Debug, Clone, Default)]
pub struct TournamentDetail {
    pub tournament: Option<RawTournament>,
    pub standings: Option<Value>,
    pub top_scorers: Option<Value>,
    pub fixtures: Option<Value>,
    pub results: Option<Value>,
}

impl TournamentDetail {
    pub fn from_value(value: &Value) -> Self {
        let pick = |keys: &[&str]| keys.iter().find_map(|k| value.get(*k)).cloned();
        Self {
            tournament: pick(&["tournament", "league", "competition"])
                .and_then(|v| serde_json::from_value(v).ok()),
            standings: pick(&["standings", "table"]),
            top_scorers: pick(&["topScorers", "top_scorers", "scorers", "leaders"]),
            fixtures: pick(&["fixtures", "upcoming"]),
            results: pick(&["results", "recent"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_of_flat_and_grouped() {
        let flat = json!([{ "team": { "id": 1, "name": "Leinster" }, "position": 1 }]);
        let rows: Vec<StandingRow> = rows_of(&flat);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].team().name.as_deref(), Some("Leinster"));

        let grouped = json!([
            { "name": "Pool A", "rows": [{ "teamName": "France" }, { "teamName": "Ireland" }] },
            { "name": "Pool B", "rows": [{ "teamId": 4, "teamName": "South Africa" }] }
        ]);
        let rows: Vec<StandingRow> = rows_of(&grouped);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].team().id.as_deref(), Some("4"));
    }

    #[test]
    fn test_rows_of_enveloped_object() {
        let value = json!({ "standings": [{ "club": { "name": "Saracens" } }] });
        let rows: Vec<StandingRow> = rows_of(&value);
        assert_eq!(rows[0].team().name.as_deref(), Some("Saracens"));
        let none: Vec<StandingRow> = rows_of(&json!("bad"));
        assert!(none.is_empty());
    }

    #[test]
    fn test_scorer_team_absent() {
        let row: ScorerRow = serde_json::from_value(json!({ "playerName": "Novak" })).unwrap();
        assert!(row.team().is_none());
        assert_eq!(row.player().name.as_deref(), Some("Novak"));
    }

    #[test]
    fn test_tournament_detail_from_value() {
        let detail = TournamentDetail::from_value(&json!({
            "tournament": { "id": "t14", "name": "Top 14" },
            "table": [],
            "topScorers": []
        }));
        assert_eq!(detail.tournament.and_then(|t| t.name).as_deref(), Some("Top 14"));
        assert!(detail.standings.is_some());
        assert!(detail.top_scorers.is_some());
        assert!(detail.fixtures.is_none());
    }
}
