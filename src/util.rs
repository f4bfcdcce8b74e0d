use crate::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use nom::{
    Parser,
    character::complete::{self, char},
    combinator::{eof, opt},
    sequence::{preceded, terminated},
};
use scraper::Selector;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

static PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})";

/// Only for static selectors known to be valid
pub fn sel(selector: &str) -> Selector {
    Selector::parse(selector).unwrap()
}

/// Collapse every run of whitespace into a single space, and trim both ends
pub fn reduce_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Cut the given string after max chars, never inside a multi-byte char
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Write value as indented JSON, keeping non-ASCII characters as they are
pub fn write_json_pretty<P: AsRef<Path>, T: Serialize + ?Sized>(path: P, value: &T) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut f, value)?;
    f.write_all(b"\n")?;
    f.flush()?;
    Ok(())
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let f = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(f)?)
}

/// "<prefix>_YYYYmmdd_HHMMSS.json", for files that must not overwrite earlier runs
pub fn timestamped_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Progress bar on stderr, or a hidden one if not enabled
pub fn progress_bar(len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

fn duration_part<'a>(
    unit: char,
) -> impl Parser<&'a str, Output = Option<u64>, Error = nom::error::Error<&'a str>> {
    opt(terminated(complete::u64, char(unit)))
}

/// Convert an ISO-8601 duration, as used by the YouTube API (e.g. "PT1H2M3S" or "P1DT2S"),
/// into whole seconds.
pub fn parse_duration_secs(s: &str) -> Option<u64> {
    let mut parser = (
        char('P'),
        duration_part('D'),
        opt(preceded(
            char('T'),
            (duration_part('H'), duration_part('M'), duration_part('S')),
        )),
        eof,
    );
    let (_, (_, days, time, _)) = parser.parse(s).ok()?;
    let (hours, minutes, seconds) = time.unwrap_or_default();
    Some(
        days.unwrap_or(0) * 86_400
            + hours.unwrap_or(0) * 3_600
            + minutes.unwrap_or(0) * 60
            + seconds.unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamped_names() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            "update_errors_20240309_070501.json",
            timestamped_file_name("update_errors", at)
        );
    }

    #[test]
    fn whitespace_is_reduced() {
        assert_eq!("a b c", reduce_whitespace("  a\n\t b \u{a0}\u{202f} c  "));
        assert_eq!("", reduce_whitespace(" \n "));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!("Gö", truncate_chars("Göteborg", 2));
        assert_eq!("abc", truncate_chars("abc", 100));
        assert_eq!("", truncate_chars("abc", 0));
    }

    #[test]
    fn json_keeps_non_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out.json");
        write_json_pretty(&p, &vec!["Göteborg", "東京"]).unwrap();
        let raw = std::fs::read_to_string(&p).unwrap();
        assert!(raw.contains("Göteborg"));
        assert!(raw.contains("東京"));
        let back: Vec<String> = read_json(&p).unwrap();
        assert_eq!(vec!["Göteborg", "東京"], back);
    }

    #[test]
    fn durations() {
        assert_eq!(Some(3723), parse_duration_secs("PT1H2M3S"));
        assert_eq!(Some(45), parse_duration_secs("PT45S"));
        assert_eq!(Some(600), parse_duration_secs("PT10M"));
        assert_eq!(Some(86_402), parse_duration_secs("P1DT2S"));
        assert_eq!(Some(0), parse_duration_secs("P0D"));
        assert_eq!(None, parse_duration_secs("1H2M"));
        assert_eq!(None, parse_duration_secs("PT1X"));
        assert_eq!(None, parse_duration_secs(""));
    }
}
