//! Plain-text rendering of matches for the terminal.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use scorecache_core::models::Match;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Kickoff as `HH:MM` in the display zone, UTC when none resolved.
pub fn format_kickoff(date: DateTime<Utc>, zone: Option<Tz>) -> String {
    match zone {
        Some(tz) => date.with_timezone(&tz).format("%H:%M").to_string(),
        None => date.format("%H:%M").to_string(),
    }
}

const TEAM_WIDTH: usize = 22;
const TOURNAMENT_WIDTH: usize = 24;

pub fn match_line(m: &Match, zone: Option<Tz>) -> String {
    let clock = match (m.is_live(), m.clock.elapsed_seconds) {
        (true, Some(secs)) => format!("{}'", secs / 60),
        _ => String::new(),
    };
    format!(
        "{:<5}  {:<9} {:>4}  {:>w$} {:^7} {:<w$}  {}",
        format_kickoff(m.date, zone),
        m.status.to_string(),
        clock,
        truncate_string(&m.home.name, TEAM_WIDTH),
        m.score_display(),
        truncate_string(&m.away.name, TEAM_WIDTH),
        truncate_string(&m.tournament.name, TOURNAMENT_WIDTH),
        w = TEAM_WIDTH,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Leinster", 20), "Leinster");
        assert_eq!(truncate_string("Stade Rochelais Charente", 10), "Stade R...");
        assert_eq!(truncate_string("Montpellier", 3), "Mon");
        assert_eq!(truncate_string("Béziers Hérault", 8), "Bézie...");
    }

    #[test]
    fn test_format_kickoff_in_zone() {
        let date = Utc.with_ymd_and_hms(2026, 2, 4, 20, 0, 0).unwrap();
        assert_eq!(format_kickoff(date, None), "20:00");
        assert_eq!(format_kickoff(date, Some(chrono_tz::Pacific::Auckland)), "09:00");
    }
}
