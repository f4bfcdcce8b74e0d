// Takeout writes the watch time in the locale of the exporting account, with a timezone
// abbreviation at the end, e.g. "Jan 1, 2023, 10:00:00 AM PST" or "1 Jan 2023, 10:00:00 CET".

use crate::util::reduce_whitespace;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use lazy_static::lazy_static;
use regex::Regex;

static NAIVE_ISO: &str = "%Y-%m-%dT%H:%M:%S";

// Tried after normalize(). %B takes both full and abbreviated month names.
static FORMATS: &[&str] = &[
    "%B %d %Y %I:%M:%S %p",
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %I:%M %p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %I:%M:%S %p",
    "%d.%m.%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

static WEEKDAYS: &[&str] = &[
    "mon", "monday", "tue", "tues", "tuesday", "wed", "wednesday", "thu", "thur", "thurs",
    "thursday", "fri", "friday", "sat", "saturday", "sun", "sunday",
];

lazy_static! {
    static ref RE_FIXED: Regex = Regex::new(
        r"(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sept?|Oct|Nov|Dec) \d{1,2},? \d{4},? \d{1,2}:\d{2}:\d{2} ?[AP]M [A-Z]{2,5}\b"
    )
    .unwrap();
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("no timestamp text")]
    Empty,
    #[error("unrecognized timestamp: {0:?}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Zone {
    /// No zone given at all
    None,
    /// A zone we know the offset for
    Known(FixedOffset),
    /// Looks like a zone abbreviation, but not one we know. Dropped, like dateutil does.
    Unknown,
}

/// Find the first "Mon D, YYYY, H:MM:SS AM TZ" timestamp in text
pub fn find_fixed(text: &str) -> Option<String> {
    let text = reduce_whitespace(text);
    RE_FIXED.find(&text).map(|m| m.as_str().to_string())
}

/// Parse a free form timestamp into an ISO-8601 string.
/// The result carries an offset if the input named a known timezone or a numeric offset, and is
/// naive otherwise.
pub fn parse(raw: &str) -> Result<String, TimestampError> {
    let s = reduce_whitespace(raw);
    if s.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false));
    }

    let normalized = normalize(&s);
    let (body, zone) = split_zone(&normalized);
    let naive = FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(body, f).ok())
        .ok_or_else(|| TimestampError::Format(s.clone()))?;

    let iso = match zone {
        Zone::Known(offset) => match naive.and_local_timezone(offset).single() {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
            None => naive.format(NAIVE_ISO).to_string(),
        },
        Zone::None | Zone::Unknown => naive.format(NAIVE_ISO).to_string(),
    };
    Ok(iso)
}

/// Drop commas and a leading weekday, and spell month names the way chrono expects
fn normalize(s: &str) -> String {
    let mut tokens: Vec<&str> = s
        .split_whitespace()
        .map(|t| t.trim_end_matches(','))
        .filter(|t| !t.is_empty())
        .collect();
    if tokens
        .first()
        .is_some_and(|t| WEEKDAYS.contains(&t.trim_end_matches('.').to_ascii_lowercase().as_str()))
    {
        tokens.remove(0);
    }
    tokens
        .into_iter()
        .map(|t| match t.trim_end_matches('.') {
            "Sept" | "sept" => "Sep",
            m if t.ends_with('.') && m.len() == 3 && m.chars().all(|c| c.is_ascii_alphabetic()) => m,
            _ => t,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_zone(s: &str) -> (&str, Zone) {
    let Some((body, last)) = s.rsplit_once(' ') else {
        return (s, Zone::None);
    };
    if last.eq_ignore_ascii_case("am") || last.eq_ignore_ascii_case("pm") {
        return (s, Zone::None);
    }
    if let Some(offset) = zone_offset(last) {
        return (body, Zone::Known(offset));
    }
    if (2..=5).contains(&last.len()) && last.chars().all(|c| c.is_ascii_uppercase()) {
        return (body, Zone::Unknown);
    }
    (s, Zone::None)
}

fn zone_offset(zone: &str) -> Option<FixedOffset> {
    if let Some(rest) = zone
        .strip_prefix("GMT")
        .or_else(|| zone.strip_prefix("UTC"))
        .filter(|r| !r.is_empty())
    {
        return numeric_offset(rest);
    }
    if let Some(offset) = numeric_offset(zone) {
        return Some(offset);
    }
    let minutes = match zone {
        "UTC" | "GMT" | "Z" | "WET" => 0,
        "BST" | "CET" | "WEST" => 60,
        "CEST" | "EET" => 120,
        "EEST" | "MSK" => 180,
        "IST" => 330,
        "AWST" => 480,
        "JST" | "KST" => 540,
        "ACST" => 570,
        "AEST" => 600,
        "AEDT" => 660,
        "NZST" => 720,
        "NZDT" => 780,
        "HST" => -600,
        "AKST" => -540,
        "AKDT" | "PST" => -480,
        "PDT" | "MST" => -420,
        "MDT" | "CST" => -360,
        "CDT" | "EST" => -300,
        "EDT" => -240,
        _ => return None,
    };
    FixedOffset::east_opt(minutes * 60)
}

/// "+01", "+0100", "-08:00"
fn numeric_offset(s: &str) -> Option<FixedOffset> {
    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = s[1..].chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<i32>().ok()?, 0)
    } else {
        let split = digits.len() - 2;
        (
            digits[..split].parse::<i32>().ok()?,
            digits[split..].parse::<i32>().ok()?,
        )
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takeout_us_format() {
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00-08:00")),
            parse("Jan 1, 2023, 10:00:00 AM PST")
        );
        assert_eq!(
            Ok(String::from("2022-07-14T21:05:09-04:00")),
            parse("Jul 14, 2022, 9:05:09 PM EDT")
        );
    }

    #[test]
    fn narrow_no_break_space_before_meridiem() {
        assert_eq!(
            Ok(String::from("2023-03-05T13:02:03+00:00")),
            parse("Mar 5, 2023, 1:02:03\u{202f}PM UTC")
        );
    }

    #[test]
    fn european_formats() {
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00+01:00")),
            parse("1 Jan 2023, 10:00:00 CET")
        );
        assert_eq!(
            Ok(String::from("2023-06-01T22:30:00+02:00")),
            parse("June 1, 2023, 10:30:00 PM GMT+02:00")
        );
    }

    #[test]
    fn british_september() {
        assert_eq!(
            Ok(String::from("2024-09-04T20:15:42+02:00")),
            parse("4 Sept 2024, 20:15:42 CEST")
        );
        assert_eq!(
            Ok(String::from("2024-09-04T20:15:42+02:00")),
            parse("Sep 4, 2024, 8:15:42 PM CEST")
        );
        assert_eq!(
            Ok(String::from("2024-09-04T20:15:42+01:00")),
            parse("Sept 4, 2024, 8:15:42 PM BST")
        );
    }

    #[test]
    fn leading_weekday() {
        for raw in [
            "Sun, Jan 1, 2023, 10:00:00 AM PST",
            "Sunday, Jan 1, 2023, 10:00:00 AM PST",
            "Sun Jan 1 2023 10:00:00 AM PST",
        ] {
            assert_eq!(Ok(String::from("2023-01-01T10:00:00-08:00")), parse(raw), "{raw}");
        }
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00+01:00")),
            parse("Sun, 1 Jan 2023, 10:00:00 CET")
        );
    }

    #[test]
    fn commas_are_optional() {
        for raw in [
            "Jan 1 2023 10:00:00 AM PST",
            "Jan 1, 2023 10:00:00 AM PST",
            "Jan 1 2023, 10:00:00 AM PST",
        ] {
            assert_eq!(Ok(String::from("2023-01-01T10:00:00-08:00")), parse(raw), "{raw}");
        }
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00+01:00")),
            parse("1 Jan 2023 10:00:00 CET")
        );
    }

    #[test]
    fn normalized_forms() {
        assert_eq!("4 Sep 2024 20:15:42 CEST", normalize("4 Sept 2024, 20:15:42 CEST"));
        assert_eq!("Jan 1 2023 10:00:00 AM PST", normalize("Mon., Jan. 1, 2023, 10:00:00 AM PST"));
        // not a weekday, so kept
        assert_eq!("Mar 5 2023", normalize("Mar 5, 2023"));
    }

    #[test]
    fn unknown_zone_gives_naive_time() {
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00")),
            parse("Jan 1, 2023, 10:00:00 AM XYZT")
        );
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00")),
            parse("Jan 1, 2023, 10:00:00 AM")
        );
    }

    #[test]
    fn rfc3339_passes_through() {
        assert_eq!(
            Ok(String::from("2023-01-01T10:00:00+00:00")),
            parse("2023-01-01T10:00:00Z")
        );
    }

    #[test]
    fn failures() {
        assert_eq!(Err(TimestampError::Empty), parse("  \n"));
        assert!(matches!(parse("yesterday-ish"), Err(TimestampError::Format(_))));
    }

    #[test]
    fn numeric_offsets() {
        assert_eq!(FixedOffset::east_opt(3600), numeric_offset("+01"));
        assert_eq!(FixedOffset::east_opt(-(5 * 3600 + 30 * 60)), numeric_offset("-0530"));
        assert_eq!(FixedOffset::east_opt(-8 * 3600), numeric_offset("-08:00"));
        assert_eq!(None, numeric_offset("08:00"));
        assert_eq!(None, numeric_offset("+abc"));
    }

    #[test]
    fn fixed_pattern_in_text() {
        assert_eq!(
            Some(String::from("Jan 1, 2023, 10:00:00 AM PST")),
            find_fixed("Watched My Video\n Jan 1,  2023, 10:00:00 AM PST Products: YouTube")
        );
        assert_eq!(None, find_fixed("Watched a video that has been removed"));
        assert_eq!(
            Some(String::from("Sept 4, 2024, 8:15:42 PM BST")),
            find_fixed("Watched x Sept 4, 2024, 8:15:42 PM BST")
        );
    }

    #[test]
    fn fixed_pattern_zone_ends_at_word_boundary() {
        // a following all-caps word is not part of the zone
        assert_eq!(
            Some(String::from("Jan 1, 2023, 10:00:00 AM PST")),
            find_fixed("Jan 1, 2023, 10:00:00 AM PST YOUTUBE")
        );
        assert_eq!(None, find_fixed("Jan 1, 2023, 10:00:00 AM PSTYOUTUBE"));
    }
}
