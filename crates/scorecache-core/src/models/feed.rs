//! Raw upstream payload shapes.
//!
//! The feed returns either a flat list of match rows or a list of
//! tournament groups, and field names differ per sport. The shape is
//! detected once into [`FeedPayload`] and every row is read through the
//! aliases declared on [`RawMatch`], so call sites never look fields up by hand.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::matches::{
    Match, MatchClock, MatchStatus, PublicationStatus, Score, TeamSummary, TournamentSummary,
};

/// Envelope keys under which a list of rows or groups may be wrapped.
const LIST_ENVELOPE_KEYS: &[&str] = &["matches", "events", "data", "results", "fixtures"];

/// Envelope keys that always carry tournament groups.
const GROUP_ENVELOPE_KEYS: &[&str] = &["tournaments", "groups", "leagues", "competitions"];

/// Keys that mark a list element as a tournament group rather than a match row.
const GROUP_ROW_KEYS: &[&str] = &["matches", "events", "fixtures"];

/// Keys under which a group nests its tournament description.
const GROUP_TOURNAMENT_KEYS: &[&str] = &["tournament", "league", "competition"];

/// Name used for teams the upstream sends without one.
pub const UNKNOWN_TEAM: &str = "TBD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTeam {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "displayName", alias = "teamName", alias = "title")]
    pub name: Option<String>,
    #[serde(default, rename = "shortName", alias = "abbreviation", alias = "short")]
    pub short_name: Option<String>,
    #[serde(default, alias = "logoUrl", alias = "crest", alias = "image", alias = "badge")]
    pub logo: Option<String>,
    #[serde(default, alias = "nationality")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTournament {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "title", alias = "displayName")]
    pub name: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default, alias = "category", alias = "region")]
    pub country: Option<String>,
    #[serde(default, alias = "logoUrl", alias = "image", alias = "emblem")]
    pub logo: Option<String>,
}

/// Status arrives as a bare label or as an object carrying a code and text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Label(String),
    Detailed {
        #[serde(default, rename = "type", alias = "code", alias = "state")]
        kind: Option<String>,
        #[serde(default, alias = "short", alias = "description")]
        label: Option<String>,
    },
}

impl RawStatus {
    fn label(&self) -> Option<&str> {
        match self {
            RawStatus::Label(s) => Some(s.as_str()),
            RawStatus::Detailed { kind, label } => kind.as_deref().or(label.as_deref()),
        }
    }

    fn period_label(&self) -> Option<&str> {
        match self {
            RawStatus::Label(_) => None,
            RawStatus::Detailed { label, .. } => label.as_deref(),
        }
    }
}

/// Scores arrive as numbers, numeric strings, or an object with a current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScore {
    Number(u32),
    Text(String),
    Detailed {
        #[serde(default, alias = "display", alias = "total")]
        current: Option<u32>,
    },
}

impl RawScore {
    fn value(&self) -> Option<u32> {
        match self {
            RawScore::Number(n) => Some(*n),
            RawScore::Text(s) => s.trim().parse().ok(),
            RawScore::Detailed { current } => *current,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawClock {
    #[serde(default, alias = "isRunning", alias = "ticking")]
    pub running: Option<bool>,
    #[serde(default, alias = "elapsedSeconds", alias = "seconds")]
    pub elapsed: Option<u32>,
    #[serde(default, alias = "periodLabel", alias = "label")]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMatch {
    #[serde(default, alias = "matchId", alias = "eventId", alias = "fixtureId", deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "startTime", alias = "kickoff", alias = "startDate", alias = "datetime")]
    pub date: Option<String>,
    #[serde(default, rename = "startTimestamp")]
    pub start_timestamp: Option<i64>,
    #[serde(default, alias = "state", alias = "matchStatus")]
    pub status: Option<RawStatus>,

    #[serde(default, rename = "homeTeam", alias = "home")]
    pub home_team: Option<RawTeam>,
    #[serde(default, rename = "awayTeam", alias = "away")]
    pub away_team: Option<RawTeam>,
    #[serde(default, rename = "homeTeamId", deserialize_with = "string_or_number")]
    pub home_team_id: Option<String>,
    #[serde(default, rename = "awayTeamId", deserialize_with = "string_or_number")]
    pub away_team_id: Option<String>,
    #[serde(default, rename = "homeTeamName")]
    pub home_team_name: Option<String>,
    #[serde(default, rename = "awayTeamName")]
    pub away_team_name: Option<String>,

    #[serde(default, rename = "homeScore")]
    pub home_score: Option<RawScore>,
    #[serde(default, rename = "awayScore")]
    pub away_score: Option<RawScore>,

    #[serde(default, alias = "time")]
    pub clock: Option<RawClock>,
    #[serde(default)]
    pub minute: Option<u32>,

    #[serde(default, alias = "league", alias = "competition")]
    pub tournament: Option<RawTournament>,
    #[serde(default, rename = "tournamentId", alias = "leagueId", deserialize_with = "string_or_number")]
    pub tournament_id: Option<String>,
    #[serde(default, rename = "tournamentName", alias = "leagueName")]
    pub tournament_name: Option<String>,
}

/// Which side of a fixture a team was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl RawMatch {
    /// Team as observed on one side, merging the nested object with the
    /// top-level `homeTeamId`/`homeTeamName` style fields.
    pub fn team(&self, side: Side) -> RawTeam {
        let (nested, id, name) = match side {
            Side::Home => (&self.home_team, &self.home_team_id, &self.home_team_name),
            Side::Away => (&self.away_team, &self.away_team_id, &self.away_team_name),
        };
        let mut team = nested.clone().unwrap_or_default();
        if team.id.is_none() {
            team.id = id.clone();
        }
        if team.name.is_none() {
            team.name = name.clone();
        }
        team
    }

    /// Tournament described by the row itself, if any.
    pub fn own_tournament(&self) -> Option<RawTournament> {
        let mut tournament = self.tournament.clone().unwrap_or_default();
        if tournament.id.is_none() {
            tournament.id = self.tournament_id.clone();
        }
        if tournament.name.is_none() {
            tournament.name = self.tournament_name.clone();
        }
        if tournament.id.is_none() && tournament.name.is_none() {
            None
        } else {
            Some(tournament)
        }
    }

    fn kickoff(&self) -> Option<DateTime<Utc>> {
        if let Some(ts) = self.start_timestamp {
            // Some sports send milliseconds
            let secs = if ts > 10_000_000_000 { ts / 1000 } else { ts };
            return Utc.timestamp_opt(secs, 0).single();
        }
        self.date.as_deref().and_then(parse_kickoff)
    }
}

/// Accept RFC 3339, naive `YYYY-MM-DD HH:MM:SS` (assumed UTC), or a bare date.
pub fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// A tournament group with its rows.
#[derive(Debug, Clone, Default)]
pub struct TournamentGroup {
    pub tournament: RawTournament,
    pub matches: Vec<RawMatch>,
}

/// Detected upstream shape.
#[derive(Debug, Clone)]
pub enum FeedPayload {
    Flat(Vec<RawMatch>),
    GroupedByTournament(Vec<TournamentGroup>),
}

/// One match row plus the tournament of the group it was found in.
#[derive(Debug, Clone)]
pub struct MatchObservation {
    pub context: Option<RawTournament>,
    pub raw: RawMatch,
}

impl FeedPayload {
    /// Detect the payload shape. Rows that fail to deserialize are skipped.
    pub fn detect(value: Value) -> Result<Self, serde_json::Error> {
        let (items, forced_grouped) = match value {
            Value::Array(items) => (items, false),
            Value::Object(mut map) => {
                if let Some(groups) = take_array(&mut map, GROUP_ENVELOPE_KEYS) {
                    (groups, true)
                } else if let Some(items) = take_array(&mut map, LIST_ENVELOPE_KEYS) {
                    (items, false)
                } else {
                    // A single row or group on its own
                    (vec![Value::Object(map)], false)
                }
            }
            Value::Null => (Vec::new(), false),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a list or object payload, got {}",
                    json_kind(&other)
                )))
            }
        };

        let grouped = forced_grouped
            || items.first().map(is_group_row).unwrap_or(false);

        if grouped {
            Ok(FeedPayload::GroupedByTournament(
                items.into_iter().filter_map(parse_group).collect(),
            ))
        } else {
            Ok(FeedPayload::Flat(
                items.into_iter().filter_map(parse_row).collect(),
            ))
        }
    }

    /// Flatten into per-match observations, keeping each group's tournament as context.
    pub fn into_observations(self) -> Vec<MatchObservation> {
        match self {
            FeedPayload::Flat(rows) => rows
                .into_iter()
                .map(|raw| MatchObservation { context: None, raw })
                .collect(),
            FeedPayload::GroupedByTournament(groups) => groups
                .into_iter()
                .flat_map(|group| {
                    let context = group.tournament;
                    group.matches.into_iter().map(move |raw| MatchObservation {
                        context: Some(context.clone()),
                        raw,
                    })
                })
                .collect(),
        }
    }

    /// Normalize every row into a canonical match, dropping rows without an id or kickoff.
    pub fn into_matches(self, sport: &str) -> Vec<Match> {
        self.into_observations()
            .iter()
            .filter_map(|obs| obs.to_match(sport))
            .collect()
    }
}

impl MatchObservation {
    /// Tournament for this row: the row's own description, filled in from
    /// the enclosing group where the row is anonymous.
    pub fn tournament(&self) -> Option<RawTournament> {
        match (self.raw.own_tournament(), &self.context) {
            (Some(mut own), Some(ctx)) => {
                if own.name.is_none() {
                    own.name = ctx.name.clone();
                }
                if own.id.is_none() && own.name == ctx.name {
                    own.id = ctx.id.clone();
                }
                if own.sport.is_none() {
                    own.sport = ctx.sport.clone();
                }
                Some(own)
            }
            (Some(own), None) => Some(own),
            (None, ctx) => ctx.clone(),
        }
    }

    pub fn to_match(&self, sport: &str) -> Option<Match> {
        let raw = &self.raw;
        let Some(id) = raw.id.clone().filter(|id| !id.trim().is_empty()) else {
            debug!(sport = sport, "Dropping match row without id");
            return None;
        };
        let Some(date) = raw.kickoff() else {
            debug!(sport = sport, match_id = %id, "Dropping match row without kickoff");
            return None;
        };

        let status = raw
            .status
            .as_ref()
            .and_then(RawStatus::label)
            .map(MatchStatus::from_upstream)
            .unwrap_or_default();

        let raw_clock = raw.clock.clone().unwrap_or_default();
        let clock = MatchClock {
            running: raw_clock.running.unwrap_or(status == MatchStatus::Live),
            elapsed_seconds: raw_clock.elapsed.or(raw.minute.map(|m| m.saturating_mul(60))),
            period: raw_clock
                .period
                .or_else(|| raw.status.as_ref().and_then(RawStatus::period_label).map(String::from)),
        };

        let tournament = self.tournament().unwrap_or_default();
        let tournament_id = tournament.id.clone();

        Some(Match {
            id,
            tournament_id: tournament_id.clone(),
            date,
            status,
            score: Score {
                home: raw.home_score.as_ref().and_then(RawScore::value),
                away: raw.away_score.as_ref().and_then(RawScore::value),
            },
            clock,
            home: summarize_team(raw.team(Side::Home)),
            away: summarize_team(raw.team(Side::Away)),
            tournament: TournamentSummary {
                id: tournament_id,
                name: tournament.name.unwrap_or_default(),
                sport: tournament.sport.unwrap_or_else(|| sport.to_string()),
                status: PublicationStatus::Published,
            },
        })
    }
}

fn summarize_team(team: RawTeam) -> TeamSummary {
    TeamSummary {
        id: team.id,
        name: team
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TEAM.to_string()),
        logo: team.logo,
        short_name: team.short_name,
    }
}

fn take_array(map: &mut serde_json::Map<String, Value>, keys: &[&str]) -> Option<Vec<Value>> {
    for key in keys {
        if matches!(map.get(*key), Some(Value::Array(_))) {
            if let Some(Value::Array(items)) = map.remove(*key) {
                return Some(items);
            }
        }
    }
    None
}

fn is_group_row(value: &Value) -> bool {
    GROUP_ROW_KEYS
        .iter()
        .any(|key| matches!(value.get(*key), Some(Value::Array(_))))
}

fn parse_row(value: Value) -> Option<RawMatch> {
    match serde_json::from_value::<RawMatch>(value) {
        Ok(row) => Some(row),
        Err(e) => {
            debug!(error = %e, "Skipping malformed match row");
            None
        }
    }
}

fn parse_group(value: Value) -> Option<TournamentGroup> {
    let Value::Object(mut map) = value else {
        return None;
    };
    let rows = take_array(&mut map, GROUP_ROW_KEYS).unwrap_or_default();

    let nested = GROUP_TOURNAMENT_KEYS
        .iter()
        .find_map(|key| map.remove(*key))
        .filter(Value::is_object);
    let tournament_value = nested.unwrap_or(Value::Object(map));
    let tournament = serde_json::from_value::<RawTournament>(tournament_value).unwrap_or_default();

    Some(TournamentGroup {
        tournament,
        matches: rows.into_iter().filter_map(parse_row).collect(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ids come through as strings for some sports and as numbers for others.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_flat_list_with_nested_teams() {
        let payload = json!([
            {
                "id": 101,
                "startTimestamp": 1770217200,
                "status": { "type": "inprogress", "description": "2nd half" },
                "homeTeam": { "id": 7, "name": "Leinster", "shortName": "LEI" },
                "awayTeam": { "id": 9, "name": "Munster" },
                "homeScore": { "current": 17 },
                "awayScore": { "current": 10 },
                "tournament": { "id": "urc", "name": "United Rugby Championship" }
            }
        ]);

        let matches = FeedPayload::detect(payload).unwrap().into_matches("rugby");
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.id, "101");
        assert_eq!(m.status, MatchStatus::Live);
        assert_eq!(m.score_display(), "17-10");
        assert_eq!(m.home.id.as_deref(), Some("7"));
        assert_eq!(m.home.short_name.as_deref(), Some("LEI"));
        assert!(m.clock.running);
        assert_eq!(m.clock.period.as_deref(), Some("2nd half"));
        assert_eq!(m.tournament.sport, "rugby");
    }

    #[test]
    fn test_detect_flat_list_with_top_level_team_fields() {
        let payload = json!({
            "matches": [
                {
                    "matchId": "abc",
                    "date": "2026-02-04 18:30:00",
                    "status": "FT",
                    "homeTeamId": "h1",
                    "homeTeamName": "Arsenal",
                    "awayTeamId": "a1",
                    "awayTeamName": "Chelsea",
                    "homeScore": "2",
                    "awayScore": 1,
                    "minute": 90
                }
            ]
        });

        let matches = FeedPayload::detect(payload).unwrap().into_matches("football");
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.status, MatchStatus::Final);
        assert_eq!(m.home.name, "Arsenal");
        assert_eq!(m.away.id.as_deref(), Some("a1"));
        assert_eq!(m.score_display(), "2-1");
        assert_eq!(m.clock.elapsed_seconds, Some(5400));
        assert!(!m.clock.running);
        assert_eq!(m.date.to_rfc3339(), "2026-02-04T18:30:00+00:00");
    }

    #[test]
    fn test_detect_grouped_payload_names_anonymous_rows() {
        let payload = json!([
            {
                "tournament": { "id": 55, "name": "Top 14" },
                "events": [
                    { "id": "e1", "date": "2026-02-04T20:00:00Z", "home": { "name": "Toulouse" }, "away": { "name": "Racing 92" } },
                    { "id": "e2", "date": "2026-02-04T21:00:00Z" }
                ]
            },
            {
                "name": "Premiership",
                "matches": [
                    { "id": "e3", "date": "2026-02-04T19:45:00Z" }
                ]
            }
        ]);

        let payload = FeedPayload::detect(payload).unwrap();
        assert!(matches!(payload, FeedPayload::GroupedByTournament(ref g) if g.len() == 2));

        let matches = payload.into_matches("rugby");
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].tournament.name, "Top 14");
        assert_eq!(matches[0].tournament_id.as_deref(), Some("55"));
        assert_eq!(matches[1].home.name, UNKNOWN_TEAM);
        assert_eq!(matches[2].tournament.name, "Premiership");
        assert_eq!(matches[2].tournament_id, None);
    }

    #[test]
    fn test_rows_without_id_or_kickoff_are_dropped() {
        let payload = json!([
            { "date": "2026-02-04T20:00:00Z" },
            { "id": "no-date" },
            { "id": "ok", "date": "2026-02-04" }
        ]);
        let matches = FeedPayload::detect(payload).unwrap().into_matches("rugby");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "ok");
    }

    #[test]
    fn test_detect_rejects_scalars() {
        assert!(FeedPayload::detect(json!("nope")).is_err());
        let empty = FeedPayload::detect(Value::Null).unwrap();
        assert!(empty.into_matches("rugby").is_empty());
    }

    #[test]
    fn test_millisecond_timestamps() {
        let payload = json!([{ "id": 1, "startTimestamp": 1770217200000i64 }]);
        let matches = FeedPayload::detect(payload).unwrap().into_matches("rugby");
        assert_eq!(matches[0].date.timestamp(), 1770217200);
    }

    #[test]
    fn test_absurd_minute_saturates_elapsed_clock() {
        let payload = json!([{ "id": "m", "date": "2026-02-04T20:00:00Z", "minute": u32::MAX }]);
        let matches = FeedPayload::detect(payload).unwrap().into_matches("rugby");
        assert_eq!(matches[0].clock.elapsed_seconds, Some(u32::MAX));
    }
}
