//! Calendar-day bucketing in a caller-supplied IANA zone.
//!
//! None of these functions fail: a missing or unresolvable zone degrades
//! to UTC. Legacy zone names are canonicalized once, where a caller's
//! zone string enters the system, because the upstream only accepts the
//! modern identifiers.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// Day key format shared by the cache, the prefetcher and the upstream query.
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Backward-compatible zone names some runtimes still report, mapped to
/// the identifiers the upstream provider requires.
const LEGACY_ZONES: &[(&str, &str)] = &[
    ("Africa/Asmera", "Africa/Asmara"),
    ("America/Buenos_Aires", "America/Argentina/Buenos_Aires"),
    ("America/Catamarca", "America/Argentina/Catamarca"),
    ("America/Cordoba", "America/Argentina/Cordoba"),
    ("America/Godthab", "America/Nuuk"),
    ("America/Indianapolis", "America/Indiana/Indianapolis"),
    ("America/Louisville", "America/Kentucky/Louisville"),
    ("Asia/Calcutta", "Asia/Kolkata"),
    ("Asia/Dacca", "Asia/Dhaka"),
    ("Asia/Katmandu", "Asia/Kathmandu"),
    ("Asia/Macao", "Asia/Macau"),
    ("Asia/Rangoon", "Asia/Yangon"),
    ("Asia/Saigon", "Asia/Ho_Chi_Minh"),
    ("Asia/Thimbu", "Asia/Thimphu"),
    ("Asia/Ulan_Bator", "Asia/Ulaanbaatar"),
    ("Atlantic/Faeroe", "Atlantic/Faroe"),
    ("Australia/ACT", "Australia/Sydney"),
    ("Australia/NSW", "Australia/Sydney"),
    ("Europe/Kiev", "Europe/Kyiv"),
    ("GB", "Europe/London"),
    ("NZ", "Pacific/Auckland"),
    ("Pacific/Ponape", "Pacific/Pohnpei"),
    ("Pacific/Truk", "Pacific/Chuuk"),
    ("US/Central", "America/Chicago"),
    ("US/Eastern", "America/New_York"),
    ("US/Mountain", "America/Denver"),
    ("US/Pacific", "America/Los_Angeles"),
];

/// Map a legacy zone identifier to its modern name; anything else is returned trimmed.
pub fn canonical_zone(name: &str) -> &str {
    let name = name.trim();
    LEGACY_ZONES
        .iter()
        .find(|(legacy, _)| *legacy == name)
        .map(|(_, modern)| *modern)
        .unwrap_or(name)
}

/// Canonicalize and resolve a zone. `None` means "use UTC".
pub fn resolve_zone(name: Option<&str>) -> Option<Tz> {
    let name = name.map(canonical_zone).filter(|n| !n.is_empty())?;
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            debug!(zone = name, "Unresolvable timezone, falling back to UTC");
            None
        }
    }
}

/// Name of the zone actually used for a caller-supplied zone string.
pub fn effective_zone_name(name: Option<&str>) -> String {
    resolve_zone(name)
        .map(|tz| tz.name().to_string())
        .unwrap_or_else(|| "UTC".to_string())
}

/// Calendar day of `instant` in an already-resolved zone.
pub fn day_key_in(instant: DateTime<Utc>, zone: Option<Tz>) -> String {
    match zone {
        Some(tz) => instant.with_timezone(&tz).format(DAY_KEY_FORMAT).to_string(),
        None => instant.format(DAY_KEY_FORMAT).to_string(),
    }
}

/// Calendar day of `instant` in the named zone, or in UTC if it cannot be resolved.
pub fn day_key(instant: DateTime<Utc>, zone: Option<&str>) -> String {
    day_key_in(instant, resolve_zone(zone))
}

/// Day keys for `[today - back, today + forward]`, each computed from `now` on its own.
pub fn day_range(now: DateTime<Utc>, zone: Option<&str>, back: u32, forward: u32) -> Vec<String> {
    let tz = resolve_zone(zone);
    (-(back as i64)..=forward as i64)
        .map(|offset| day_key_in(now + Duration::days(offset), tz))
        .collect()
}
