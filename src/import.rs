//! Import of extracted history entries into the store.

use crate::{
    Result,
    db::{ImportCounts, Store},
    models::{HistoryEntry, ImportFailure, WatchEntry, WatchRows},
    util::{read_json, timestamped_file_name, write_json_pretty},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::{fs, path::PathBuf};
use tracing::{info, warn};

static NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
static ERRORS_PREFIX: &str = "import_errors";

#[derive(Debug, Clone)]
pub struct ImportOpts {
    pub input: PathBuf,
    pub error_dir: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub entries: usize,
    pub imported: ImportCounts,
    pub failed: usize,
    pub errors_file: Option<PathBuf>,
}

/// watched_at as written by the extractor: with an offset, or naive and taken as UTC
fn parse_watched_at(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, NAIVE_FORMAT)
                .ok()
                .map(|t| t.and_utc())
        })
}

/// Split entries into what can go into the store and what cannot
pub fn validate(
    entries: Vec<HistoryEntry>,
    now: DateTime<Utc>,
) -> (Vec<WatchEntry>, Vec<ImportFailure>) {
    let mut ok = Vec::with_capacity(entries.len());
    let mut failed = Vec::new();

    for entry in entries {
        let Some(video_id) = entry.video_id.as_deref().filter(|v| !v.is_empty()) else {
            failed.push(ImportFailure {
                entry,
                error: String::from("missing video_id"),
                timestamp: now,
            });
            continue;
        };
        let Some(watched_at) = entry.watched_at.as_deref().and_then(parse_watched_at) else {
            let error = match entry.watched_at.as_deref() {
                Some(raw) => format!("unparseable watched_at: {raw}"),
                None => String::from("missing watched_at"),
            };
            failed.push(ImportFailure {
                entry,
                error,
                timestamp: now,
            });
            continue;
        };
        ok.push(WatchEntry {
            video_id: video_id.to_string(),
            channel_id: entry.channel_id().map(String::from),
            title: entry.title,
            channel_title: entry.channel_title,
            watched_at,
        });
    }

    (ok, failed)
}

pub async fn run<D: Store>(store: &D, opts: &ImportOpts) -> Result<ImportSummary> {
    let entries: Vec<HistoryEntry> = read_json(&opts.input)?;
    let now = Utc::now();
    let mut sum = ImportSummary {
        entries: entries.len(),
        ..Default::default()
    };
    info!(path = %opts.input.display(), entries = sum.entries, "Importing history");

    let (ok, failed) = validate(entries, now);
    sum.failed = failed.len();

    if !failed.is_empty() {
        fs::create_dir_all(&opts.error_dir)?;
        let p = opts.error_dir.join(timestamped_file_name(ERRORS_PREFIX, now));
        write_json_pretty(&p, &failed)?;
        warn!(path = %p.display(), failed = sum.failed, "Some entries could not be imported");
        sum.errors_file = Some(p);
    }

    if !ok.is_empty() {
        sum.imported = store.import_watches(WatchRows::from(ok)).await?;
    }
    info!(
        videos = sum.imported.videos,
        watches = sum.imported.watches,
        "Import done"
    );

    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::PLATFORM, refresh::tests::MemStore};
    use chrono::TimeZone;

    fn entry(id: Option<&str>, at: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            title: format!("title {}", id.unwrap_or("-")),
            url: String::new(),
            video_id: id.map(Into::into),
            channel_title: Some("Chan".into()),
            channel_url: Some("https://www.youtube.com/channel/UC123".into()),
            watched_at: at.map(String::from),
            platform: PLATFORM.into(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn watched_at_formats() {
        assert_eq!(
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 18, 0, 0).unwrap()),
            parse_watched_at("2023-01-01T10:00:00-08:00")
        );
        assert_eq!(
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()),
            parse_watched_at("2023-01-01T10:00:00")
        );
        assert_eq!(None, parse_watched_at("Jan 1, 2023"));
    }

    #[test]
    fn validation_splits_entries() {
        let (ok, failed) = validate(
            vec![
                entry(Some("a"), Some("2023-01-01T10:00:00-08:00")),
                entry(None, Some("2023-01-01T10:00:00")),
                entry(Some("b"), None),
                entry(Some("c"), Some("yesterday")),
                entry(Some(""), Some("2023-01-01T10:00:00")),
            ],
            now(),
        );
        assert_eq!(1, ok.len());
        assert_eq!("a", ok[0].video_id);
        assert_eq!(Some("UC123"), ok[0].channel_id.as_deref());
        let errors: Vec<&str> = failed.iter().map(|f| f.error.as_str()).collect();
        assert_eq!(
            vec![
                "missing video_id",
                "missing watched_at",
                "unparseable watched_at: yesterday",
                "missing video_id"
            ],
            errors
        );
        assert!(failed.iter().all(|f| f.timestamp == now()));
    }

    #[tokio::test]
    async fn import_writes_errors_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("watch-history.json");
        write_json_pretty(
            &input,
            &vec![
                entry(Some("a"), Some("2023-01-01T10:00:00-08:00")),
                entry(Some("a"), Some("2023-01-02T10:00:00-08:00")),
                entry(Some("b"), Some("2023-01-03T10:00:00")),
                entry(None, None),
            ],
        )
        .unwrap();

        let store = MemStore::with_videos(&[("b", None)]);
        let opts = ImportOpts {
            input,
            error_dir: dir.path().join("errors"),
        };
        let sum = run(&store, &opts).await.unwrap();
        assert_eq!(4, sum.entries);
        assert_eq!(1, sum.failed);
        assert_eq!(
            ImportCounts {
                videos: 1,
                watches: 3
            },
            sum.imported
        );
        let p = sum.errors_file.unwrap();
        assert!(
            p.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("import_errors_")
        );
        let failed: Vec<ImportFailure> = read_json(&p).unwrap();
        assert_eq!(None, failed[0].entry.video_id);
        assert_eq!(3, store.watches.lock().unwrap().len());
    }

    #[tokio::test]
    async fn clean_import_has_no_error_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("watch-history.json");
        write_json_pretty(&input, &vec![entry(Some("a"), Some("2023-01-01T10:00:00"))]).unwrap();
        let store = MemStore::default();
        let opts = ImportOpts {
            input,
            error_dir: dir.path().join("errors"),
        };
        let sum = run(&store, &opts).await.unwrap();
        assert_eq!(None, sum.errors_file);
        assert!(!opts.error_dir.exists());
    }
}
