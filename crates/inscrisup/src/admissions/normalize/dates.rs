//! Date encodings used by the admissions platform.
//!
//! The management website prints French month names ("12 juin 2024 14:35",
//! or just "12 juin" for offer dates); the push API uses `dd/mm/yyyy` with an
//! optional `HH:MM`, and one of its variants encodes the year on three digits.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const FRENCH_MONTHS: &[(&str, u32)] = &[
    ("janvier", 1),
    ("janv", 1),
    ("jan", 1),
    ("fevrier", 2),
    ("fevr", 2),
    ("fev", 2),
    ("mars", 3),
    ("mar", 3),
    ("avril", 4),
    ("avr", 4),
    ("mai", 5),
    ("juin", 6),
    ("juillet", 7),
    ("juil", 7),
    ("aout", 8),
    ("septembre", 9),
    ("sept", 9),
    ("sep", 9),
    ("octobre", 10),
    ("oct", 10),
    ("novembre", 11),
    ("nov", 11),
    ("decembre", 12),
    ("dec", 12),
];

fn fold_accents(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'é' | 'è' | 'ê' | 'É' | 'È' | 'Ê' => 'e',
            'û' | 'ù' | 'Û' | 'Ù' => 'u',
            'ô' | 'Ô' => 'o',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Month number for a French month name or abbreviation, accents optional.
pub fn french_month(name: &str) -> Option<u32> {
    let folded = fold_accents(name.trim().trim_end_matches('.'));
    FRENCH_MONTHS
        .iter()
        .find(|(candidate, _)| *candidate == folded)
        .map(|(_, month)| *month)
}

fn parse_hour_minute(value: &str) -> Option<NaiveTime> {
    let (hour, minute) = value.trim().split_once(':')?;
    NaiveTime::from_hms_opt(hour.trim().parse().ok()?, minute.trim().parse().ok()?, 0)
}

/// Parses `"12 juin 2024 14:35"`.
pub fn parse_french_datetime(value: &str) -> Option<NaiveDateTime> {
    let mut parts = value.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month = french_month(parts.next()?)?;
    let year: i32 = parts.next()?.parse().ok()?;
    let time = parse_hour_minute(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.and_time(time))
}

/// Parses `"12 juin"`, substituting `year` and midnight.
pub fn parse_french_day_month(value: &str, year: i32) -> Option<NaiveDateTime> {
    let mut parts = value.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month = french_month(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day).and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn decode_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    match raw.len() {
        3 => Some(year + 2000),
        4 => Some(year),
        _ => None,
    }
}

/// Parses `"dd/mm/yyyy"`; a three-digit year is read as an offset from 2000.
pub fn parse_slash_date(value: &str) -> Option<NaiveDate> {
    let mut parts = value.trim().split('/');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year = decode_year(parts.next()?.trim())?;
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses `"dd/mm/yyyy HH:MM"` or a bare `"dd/mm/yyyy"` (midnight).
pub fn parse_slash_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    match trimmed.split_once(' ') {
        Some((date, time)) => Some(parse_slash_date(date)?.and_time(parse_hour_minute(time)?)),
        None => parse_slash_date(trimmed)?.and_hms_opt(0, 0, 0),
    }
}
