//! Date/timestamp conversion and formatting.
//!
//! `Date` is stored as a signed i32 day count from 1970-01-01; `Timestamp`
//! as a signed i64 microsecond count from the same epoch. The conversions
//! are built on `chrono`'s `NaiveDate`/`NaiveDateTime` (the teacher already
//! depends on `chrono` for timestamp handling) rather than hand-rolled
//! Gregorian calendar math.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Days since epoch -> (year, month, day).
pub fn days_to_ymd(days: i32) -> (i32, u32, u32) {
    let d = epoch() + chrono::Duration::days(days as i64);
    (d.year(), d.month(), d.day())
}

/// (year, month, day) -> days since epoch, if the calendar date is valid.
pub fn ymd_to_days(y: i32, m: u32, d: u32) -> Option<i32> {
    let date = NaiveDate::from_ymd_opt(y, m, d)?;
    Some((date - epoch()).num_days() as i32)
}

/// Microseconds since epoch -> (year, month, day, hour, minute, second, micros).
pub fn micros_to_ymdhmsu(us: i64) -> (i32, u32, u32, u32, u32, u32, u32) {
    let secs = us.div_euclid(1_000_000);
    let micros = us.rem_euclid(1_000_000) as u32;
    let dt = NaiveDateTime::from_timestamp_opt(secs, micros * 1_000)
        .expect("microsecond timestamp out of chrono's representable range");
    (
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        micros,
    )
}

/// (y, m, d, h, mi, s, us) -> microseconds since epoch, if valid.
#[allow(clippy::too_many_arguments)]
pub fn ymdhmsu_to_micros(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32, us: u32) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(y, m, d)?;
    let time = chrono::NaiveTime::from_hms_micro_opt(h, mi, s, us)?;
    let dt = NaiveDateTime::new(date, time);
    Some(dt.and_utc().timestamp_micros())
}

/// Canonical `YYYY-MM-DD` formatter.
pub fn format_date(days: i32) -> String {
    let (y, m, d) = days_to_ymd(days);
    format!("{y:04}-{m:02}-{d:02}")
}

/// Canonical `YYYY-MM-DD` parser, strict (no partial matches).
pub fn parse_date(s: &str) -> Option<i32> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    let y: i32 = s.get(0..4)?.parse().ok()?;
    let m: u32 = s.get(5..7)?.parse().ok()?;
    let d: u32 = s.get(8..10)?.parse().ok()?;
    ymd_to_days(y, m, d)
}

/// Formatter for `YYYY-MM-DDTHH:MM:SS[.ffffff]Z`, UTC, fractional seconds
/// only when non-zero and with trailing zeros trimmed.
pub fn format_timestamp(us: i64) -> String {
    let (y, mo, d, h, mi, s, micros) = micros_to_ymdhmsu(us);
    if micros == 0 {
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
    } else {
        let mut frac = format!("{micros:06}");
        while frac.ends_with('0') {
            frac.pop();
        }
        format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{frac}Z")
    }
}

/// Parser for `YYYY-MM-DD[T| ]HH:MM:SS[.ffffff][Z|±HH[:MM]]`, normalizing
/// any explicit offset back to UTC.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    let b = s.as_bytes();
    if b.len() < 19 {
        return None;
    }
    if b[4] != b'-' || b[7] != b'-' || (b[10] != b'T' && b[10] != b' ') || b[13] != b':' || b[16] != b':' {
        return None;
    }
    let y: i32 = s.get(0..4)?.parse().ok()?;
    let mo: u32 = s.get(5..7)?.parse().ok()?;
    let d: u32 = s.get(8..10)?.parse().ok()?;
    let h: u32 = s.get(11..13)?.parse().ok()?;
    let mi: u32 = s.get(14..16)?.parse().ok()?;
    let se: u32 = s.get(17..19)?.parse().ok()?;

    let mut rest = &s[19..];
    let mut micros: u32 = 0;
    if let Some(stripped) = rest.strip_prefix('.') {
        let frac_len = stripped
            .bytes()
            .take_while(|c| c.is_ascii_digit())
            .count();
        let frac = &stripped[..frac_len];
        let mut padded = frac.to_string();
        while padded.len() < 6 {
            padded.push('0');
        }
        padded.truncate(6);
        micros = padded.parse().ok()?;
        rest = &stripped[frac_len..];
    }

    let offset_minutes: i64 = if rest.is_empty() || rest == "Z" {
        0
    } else {
        let sign = match rest.as_bytes()[0] {
            b'+' => 1i64,
            b'-' => -1i64,
            _ => return None,
        };
        let body = &rest[1..];
        let (oh, om) = if let Some((h, m)) = body.split_once(':') {
            (h.parse::<i64>().ok()?, m.parse::<i64>().ok()?)
        } else if body.len() == 4 {
            (body[0..2].parse::<i64>().ok()?, body[2..4].parse::<i64>().ok()?)
        } else if body.len() == 2 {
            (body.parse::<i64>().ok()?, 0)
        } else {
            return None;
        };
        sign * (oh * 60 + om)
    };

    let base = ymdhmsu_to_micros(y, mo, d, h, mi, se, micros)?;
    Some(base - offset_minutes * 60 * 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_roundtrip() {
        let d = ymd_to_days(2024, 3, 15).unwrap();
        assert_eq!(days_to_ymd(d), (2024, 3, 15));
        assert_eq!(format_date(d), "2024-03-15");
        assert_eq!(parse_date("2024-03-15"), Some(d));
    }

    #[test]
    fn epoch_date_is_zero() {
        assert_eq!(ymd_to_days(1970, 1, 1), Some(0));
    }

    #[test]
    fn timestamp_roundtrip_no_fraction() {
        let us = ymdhmsu_to_micros(2024, 3, 15, 10, 30, 0, 0).unwrap();
        assert_eq!(format_timestamp(us), "2024-03-15T10:30:00Z");
        assert_eq!(parse_timestamp("2024-03-15T10:30:00Z"), Some(us));
        assert_eq!(parse_timestamp("2024-03-15 10:30:00"), Some(us));
    }

    #[test]
    fn timestamp_with_fraction_trims_trailing_zeros() {
        let us = ymdhmsu_to_micros(2024, 1, 1, 0, 0, 0, 500_000).unwrap();
        assert_eq!(format_timestamp(us), "2024-01-01T00:00:00.5Z");
    }

    #[test]
    fn timestamp_with_offset_normalizes_to_utc() {
        let utc = ymdhmsu_to_micros(2024, 1, 1, 12, 0, 0, 0).unwrap();
        let with_offset = parse_timestamp("2024-01-01T14:00:00+02:00").unwrap();
        assert_eq!(with_offset, utc);
    }

    #[test]
    fn invalid_date_rejected() {
        assert_eq!(parse_date("not-a-date"), None);
        assert_eq!(parse_date("2024-13-01"), None);
    }
}
