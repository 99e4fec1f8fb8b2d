/// Types and utilities for manipulating timestamps.
///
/// Every time in the raw logs is UTC wall-clock time written as `YYYY-MM-DDTHH:MM:SS`, with no zone
/// designator and no subsecond precision.  Internally we use a proper UTC DateTime so that
/// truncation and comparison are cheap and exact.
use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serializer;
use std::str::FromStr;

pub type Timestamp = DateTime<Utc>;

/// The format used by the log writers.

pub const LOG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The format used for day keys in reports; combined with `end_of_day` this prints as
/// `YYYY-MM-DD 23:59:59`.

pub const DAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    let t = NaiveDateTime::parse_from_str(s, LOG_TIME_FORMAT)?;
    Ok(Utc.from_utc_datetime(&t))
}

pub fn format_log_time(t: Timestamp) -> String {
    t.format(LOG_TIME_FORMAT).to_string()
}

pub fn format_day_time(t: Timestamp) -> String {
    t.format(DAY_TIME_FORMAT).to_string()
}

/// Truncate to the start of the `grain`-wide bucket containing `t`.  Buckets are aligned to the
/// Unix epoch, so for any grain that divides a day evenly the buckets line up with midnight UTC.
/// A grain shorter than one second is treated as one second.

pub fn truncate_to_grain(t: Timestamp, grain: Duration) -> Timestamp {
    let secs = grain.num_seconds().max(1);
    t - Duration::seconds(t.timestamp().rem_euclid(secs))
        - Duration::nanoseconds(t.timestamp_subsec_nanos() as i64)
}

pub fn truncate_to_day(t: Timestamp) -> Timestamp {
    truncate_to_grain(t, Duration::days(1))
}

/// The last second of the day containing `t`.

pub fn end_of_day(t: Timestamp) -> Timestamp {
    truncate_to_day(t) + Duration::days(1) - Duration::seconds(1)
}

/// serde helpers, for use with `#[serde(serialize_with = ...)]` on report fields.

pub fn serialize_log_time<S: Serializer>(t: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_log_time(*t))
}

pub fn serialize_log_times<S: Serializer>(ts: &[Timestamp], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(ts.iter().map(|t| format_log_time(*t)))
}

pub fn serialize_day_times<S: Serializer>(ts: &[Timestamp], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(ts.iter().map(|t| format_day_time(*t)))
}

// Keeps every part well inside what chrono can represent.
const MAX_DURATION_PART: i64 = 1_000_000;

/// Parse a duration on the form WwDdHhMm, with all parts optional but at least one part required.
/// There is possibly too much flexibility here, as the parts can be in any order.

pub fn parse_duration(s: &str) -> Result<Duration> {
    let mut weeks = 0i64;
    let mut days = 0i64;
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut seen = vec![];
    let mut ds = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            ds.push(ch);
            continue;
        }
        if ds.is_empty() || !"wdhm".contains(ch) || seen.contains(&ch) {
            bail!("Bad suffix")
        }
        let val = match i64::from_str(&ds) {
            Ok(v) if v <= MAX_DURATION_PART => v,
            _ => bail!("Bad number"),
        };
        ds.clear();
        seen.push(ch);
        match ch {
            'w' => weeks = val,
            'd' => days = val,
            'h' => hours = val,
            _ => minutes = val,
        }
    }
    if !ds.is_empty() || seen.is_empty() {
        bail!("Inconsistent")
    }
    Ok(Duration::weeks(weeks)
        + Duration::days(days)
        + Duration::hours(hours)
        + Duration::minutes(minutes))
}

#[test]
fn test_parse_timestamp() {
    let t = parse_timestamp("2024-03-01T09:05:07").unwrap();
    assert!(format_log_time(t) == "2024-03-01T09:05:07");
    assert!(parse_timestamp("2024-03-01 09:05:07").is_err());
    assert!(parse_timestamp("2024-03-01T09:05:07Z").is_err());
    assert!(parse_timestamp("yesterday").is_err());
}

#[test]
fn test_truncation() {
    let t = parse_timestamp("2024-03-01T09:05:07").unwrap();
    assert!(format_log_time(truncate_to_day(t)) == "2024-03-01T00:00:00");
    assert!(format_day_time(end_of_day(t)) == "2024-03-01 23:59:59");
    assert!(format_log_time(truncate_to_grain(t, Duration::hours(6))) == "2024-03-01T06:00:00");
    assert!(format_log_time(truncate_to_grain(t, Duration::minutes(15))) == "2024-03-01T09:00:00");

    // Already on a boundary
    let b = parse_timestamp("2024-03-01T12:00:00").unwrap();
    assert!(truncate_to_grain(b, Duration::hours(6)) == b);

    // Degenerate grain
    assert!(truncate_to_grain(t, Duration::zero()) == t);
}

#[test]
fn test_parse_duration() {
    // This is illegal as of now, we might want to change this?
    assert!(parse_duration("3").is_err());

    // Years (and other things) are not supported
    assert!(parse_duration("3y").is_err());
    assert!(parse_duration("d").is_err());
    assert!(parse_duration("1d1d").is_err());

    let x = parse_duration("3m").unwrap();
    assert!(x.num_minutes() == 3);
    assert!(x.num_hours() == 0);

    let x = parse_duration("6h").unwrap();
    assert!(x.num_seconds() == 6 * 60 * 60);

    let x = parse_duration("2d4h7m").unwrap();
    assert!(x.num_minutes() == (2 * 24 + 4) * 60 + 7);

    assert!(parse_duration("99999999999w").is_err());

    let x = parse_duration("1w").unwrap();
    assert!(x.num_days() == 7);
}
