//! UTC/timezone-aware timestamp normalization.
//!
//! Mirrors `autocapture_nx/kernel/timebase.py`: every timestamp written to a
//! durable store carries a UTC instant plus the timezone id and offset (in
//! minutes) used to interpret it locally, so DST transitions never silently
//! corrupt an ordering.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Format a UTC instant as RFC 3339 with a literal `Z` suffix (no offset).
pub fn utc_iso_z(dt: DateTime<Utc>) -> String {
    let text = dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    text
}

/// Current UTC instant, formatted per [`utc_iso_z`].
pub fn utc_now_z() -> String {
    utc_iso_z(Utc::now())
}

/// Offset in minutes of `tzid` relative to UTC at `at_utc`. Unknown zone ids
/// return 0 rather than failing — timestamps must never be blocked on an
/// unrecognized tzid.
pub fn tz_offset_minutes(tzid: &str, at_utc: DateTime<Utc>) -> i32 {
    if tzid.eq_ignore_ascii_case("utc") {
        return 0;
    }
    match tzid.parse::<Tz>() {
        Ok(tz) => {
            let local = at_utc.with_timezone(&tz);
            (local.offset().fix().local_minus_utc() / 60) as i32
        }
        Err(_) => 0,
    }
}

/// A timestamp normalized for durable storage: UTC instant plus the
/// timezone id and offset used to interpret it locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedTime {
    pub ts_utc: String,
    pub tzid: String,
    pub offset_minutes: i32,
}

/// Normalize `at_utc` (or now, if absent) under timezone `tzid`.
pub fn normalize_time(tzid: &str, at_utc: Option<DateTime<Utc>>) -> NormalizedTime {
    let base = at_utc.unwrap_or_else(Utc::now);
    let tz = if tzid.is_empty() { "UTC" } else { tzid };
    NormalizedTime {
        ts_utc: utc_iso_z(base),
        tzid: tz.to_string(),
        offset_minutes: tz_offset_minutes(tz, base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_now_z_has_z_suffix() {
        let s = utc_now_z();
        assert!(s.ends_with('Z'));
    }

    #[test]
    fn unknown_zone_returns_zero_offset() {
        let now = Utc::now();
        assert_eq!(tz_offset_minutes("Not/AZone", now), 0);
    }

    #[test]
    fn utc_zone_is_always_zero() {
        let now = Utc::now();
        assert_eq!(tz_offset_minutes("UTC", now), 0);
    }

    #[test]
    fn dst_transition_changes_offset() {
        // America/New_York: EST (UTC-5) in January, EDT (UTC-4) in July.
        let winter = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2026, 7, 15, 12, 0, 0).unwrap();
        let off_winter = tz_offset_minutes("America/New_York", winter);
        let off_summer = tz_offset_minutes("America/New_York", summer);
        assert_ne!(off_winter, off_summer);
        assert_eq!(off_winter, -5 * 60);
        assert_eq!(off_summer, -4 * 60);
    }

    #[test]
    fn normalize_time_defaults_to_utc_when_tzid_empty() {
        let n = normalize_time("", Some(Utc::now()));
        assert_eq!(n.tzid, "UTC");
        assert_eq!(n.offset_minutes, 0);
    }
}
