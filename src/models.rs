// The structs at the top level of this module are what we write to JSON files and the DB, while
// the structs in the api sub-module mirror what the YouTube Data API returns, and are only ever
// read.

use crate::util::parse_duration_secs;
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::hash_set::HashSet;
use uuid::Uuid;

/// Tag for every history entry, since Takeout only gives us YouTube history
pub const PLATFORM: &str = "youtube";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Video title, whitespace normalized
    pub title: String,
    /// Raw href of the video link
    pub url: String,
    /// The "v" query parameter of url
    pub video_id: Option<CompactString>,
    pub channel_title: Option<String>,
    pub channel_url: Option<String>,
    /// ISO-8601, with offset when the export named a known timezone
    pub watched_at: Option<String>,
    pub platform: CompactString,
}

impl HistoryEntry {
    /// Channel ID, if channel_url is of the form ".../channel/<id>"
    pub fn channel_id(&self) -> Option<&str> {
        let (_, rest) = self.channel_url.as_deref()?.split_once("/channel/")?;
        let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MetadataRecord {
    pub video_id: String,
    pub title: String,
    pub description: Option<String>,
    /// Max resolution thumbnail
    pub thumbnail_url: Option<String>,
    pub tags: Vec<String>,
    pub category_id: Option<String>,
    pub audio_language: Option<String>,
    /// ISO-8601 duration, e.g. "PT4M13S"
    pub duration: Option<String>,
    pub duration_seconds: Option<u64>,
    pub licensed_content: Option<bool>,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub privacy_status: Option<String>,
    pub license: Option<String>,
    pub embeddable: Option<bool>,
    pub topic_categories: Vec<String>,
    pub recording_date: Option<DateTime<Utc>>,
    pub recording_location: Option<serde_json::Value>,
    pub was_livestream: bool,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub has_paid_product_placement: Option<bool>,
    /// When this record was fetched
    pub metadata_updated_at: DateTime<Utc>,
}

fn parse_api_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|v| v.with_timezone(&Utc))
}

impl MetadataRecord {
    /// Normalize an item from the API. Returns None for anything that is not a video with at
    /// least a snippet and content details.
    pub fn from_api(video: api::Video, fetched_at: DateTime<Utc>) -> Option<Self> {
        if video.kind != api::VIDEO_KIND {
            return None;
        }
        let snippet = video.snippet?;
        let content_details = video.content_details?;
        let statistics = video.statistics.unwrap_or_default();
        let status = video.status.unwrap_or_default();
        let recording = video.recording_details.unwrap_or_default();
        let was_livestream = video.live_streaming_details.is_some();
        let live = video.live_streaming_details.unwrap_or_default();

        Some(Self {
            video_id: video.id,
            title: snippet.title,
            description: snippet.description,
            thumbnail_url: snippet.thumbnails.maxres.map(|t| t.url),
            tags: snippet.tags,
            category_id: snippet.category_id,
            audio_language: snippet.default_audio_language,
            duration_seconds: content_details
                .duration
                .as_deref()
                .and_then(parse_duration_secs),
            duration: content_details.duration,
            licensed_content: content_details.licensed_content,
            channel_id: snippet.channel_id,
            channel_title: snippet.channel_title,
            published_at: parse_api_time(snippet.published_at),
            view_count: statistics.view_count,
            like_count: statistics.like_count,
            comment_count: statistics.comment_count,
            privacy_status: status.privacy_status,
            license: status.license,
            embeddable: status.embeddable,
            topic_categories: video
                .topic_details
                .map(|t| t.topic_categories)
                .unwrap_or_default(),
            recording_date: parse_api_time(recording.recording_date),
            recording_location: recording.location,
            was_livestream,
            actual_start_time: parse_api_time(live.actual_start_time),
            actual_end_time: parse_api_time(live.actual_end_time),
            has_paid_product_placement: video
                .paid_product_placement_details
                .and_then(|p| p.has_paid_product_placement),
            metadata_updated_at: fetched_at,
        })
    }
}

/// What went wrong during a fetch, for the errors file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum FetchFailure {
    /// A single returned item could not be normalized
    Item { video_id: String, error: String },
    /// A whole chunk request failed
    Chunk {
        video_ids: Vec<String>,
        error: String,
    },
}

/// A history entry that could not be imported into the DB
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImportFailure {
    pub entry: HistoryEntry,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// A metadata record the DB refused
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFailure {
    pub video_id: String,
    pub error: String,
}

/// One watch of a video, as kept in the DB
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WatchRecord {
    pub watch_id: Uuid,
    pub watched_at: DateTime<Utc>,
}

/// A videos row with all of its columns, and every watch of it
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VideoBackup {
    pub video_id: String,
    #[serde(flatten)]
    pub columns: serde_json::Map<String, serde_json::Value>,
    pub watches: Vec<WatchRecord>,
}

/// A history entry that has everything needed for the DB
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEntry {
    pub video_id: String,
    pub title: String,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub watched_at: DateTime<Utc>,
}

/// WatchRows maps a list of WatchEntry into lists of all its fields, for use with Postgres'
/// UNNEST. Video columns are deduplicated on video_id, keeping the first occurrence, while there
/// is one watch row per entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchRows {
    pub video_ids: Vec<String>,
    pub titles: Vec<String>,
    pub channel_ids: Vec<Option<String>>,
    pub channel_titles: Vec<Option<String>>,
    pub watch_ids: Vec<Uuid>,
    pub watch_video_ids: Vec<String>,
    pub watched_ats: Vec<DateTime<Utc>>,
}

impl WatchRows {
    fn with_capacity(cap: usize) -> Self {
        Self {
            video_ids: Vec::with_capacity(cap),
            titles: Vec::with_capacity(cap),
            channel_ids: Vec::with_capacity(cap),
            channel_titles: Vec::with_capacity(cap),
            watch_ids: Vec::with_capacity(cap),
            watch_video_ids: Vec::with_capacity(cap),
            watched_ats: Vec::with_capacity(cap),
        }
    }

    pub fn num_videos(&self) -> usize {
        self.video_ids.len()
    }

    pub fn num_watches(&self) -> usize {
        self.watch_ids.len()
    }
}

impl From<Vec<WatchEntry>> for WatchRows {
    fn from(v: Vec<WatchEntry>) -> Self {
        let mut rows = Self::with_capacity(v.len());
        let mut seen = HashSet::with_capacity(v.len());

        for e in v {
            rows.watch_ids.push(Uuid::new_v4());
            rows.watch_video_ids.push(e.video_id.clone());
            rows.watched_ats.push(e.watched_at);
            if seen.insert(e.video_id.clone()) {
                rows.video_ids.push(e.video_id);
                rows.titles.push(e.title);
                rows.channel_ids.push(e.channel_id);
                rows.channel_titles.push(e.channel_title);
            }
        }

        rows
    }
}

pub mod api {
    /// Items as returned by the videos.list endpoint. Everything is optional and lenient, so
    /// that a single odd item never fails deserialization of a whole response.
    use serde::Deserialize;
    use serde_with::{DefaultOnError, DisplayFromStr, PickFirst, serde_as};

    pub const VIDEO_KIND: &str = "youtube#video";

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct VideoListResponse {
        pub items: Vec<Video>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Video {
        pub kind: String,
        pub id: String,
        pub snippet: Option<Snippet>,
        pub content_details: Option<ContentDetails>,
        pub statistics: Option<Statistics>,
        pub status: Option<Status>,
        pub topic_details: Option<TopicDetails>,
        pub recording_details: Option<RecordingDetails>,
        pub live_streaming_details: Option<LiveStreamingDetails>,
        pub paid_product_placement_details: Option<PaidProductPlacementDetails>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Snippet {
        pub title: String,
        pub description: Option<String>,
        pub thumbnails: Thumbnails,
        pub tags: Vec<String>,
        pub category_id: Option<String>,
        pub default_audio_language: Option<String>,
        pub channel_id: Option<String>,
        pub channel_title: Option<String>,
        pub published_at: Option<String>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default)]
    pub struct Thumbnails {
        pub maxres: Option<Thumbnail>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default)]
    pub struct Thumbnail {
        pub url: String,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct ContentDetails {
        pub duration: Option<String>,
        pub licensed_content: Option<bool>,
    }

    // The API sends counters as strings. Anything that does not parse as a non-negative integer
    // ends up as None.
    #[serde_as]
    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Statistics {
        #[serde_as(as = "DefaultOnError<Option<PickFirst<(DisplayFromStr, _)>>>")]
        pub view_count: Option<u64>,
        #[serde_as(as = "DefaultOnError<Option<PickFirst<(DisplayFromStr, _)>>>")]
        pub like_count: Option<u64>,
        #[serde_as(as = "DefaultOnError<Option<PickFirst<(DisplayFromStr, _)>>>")]
        pub comment_count: Option<u64>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct Status {
        pub privacy_status: Option<String>,
        pub license: Option<String>,
        pub embeddable: Option<bool>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct TopicDetails {
        pub topic_categories: Vec<String>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct RecordingDetails {
        pub recording_date: Option<String>,
        pub location: Option<serde_json::Value>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct LiveStreamingDetails {
        pub actual_start_time: Option<String>,
        pub actual_end_time: Option<String>,
    }

    #[derive(Debug, Deserialize, Clone, Default, PartialEq)]
    #[serde(default, rename_all = "camelCase")]
    pub struct PaidProductPlacementDetails {
        pub has_paid_product_placement: Option<bool>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn video(j: serde_json::Value) -> api::Video {
        serde_json::from_value(j).unwrap()
    }

    #[test]
    fn normalize_full_item() {
        let v = video(json!({
            "kind": "youtube#video",
            "id": "abc123",
            "snippet": {
                "title": "My Video",
                "description": "desc",
                "thumbnails": {
                    "default": { "url": "https://i.ytimg.com/vi/abc123/default.jpg" },
                    "maxres": { "url": "https://i.ytimg.com/vi/abc123/maxresdefault.jpg" }
                },
                "tags": ["a", "b"],
                "categoryId": "10",
                "defaultAudioLanguage": "en",
                "channelId": "UCxyz",
                "channelTitle": "Chan",
                "publishedAt": "2023-01-01T18:00:00Z"
            },
            "contentDetails": { "duration": "PT4M13S", "licensedContent": true },
            "statistics": { "viewCount": "1234", "likeCount": "56", "commentCount": "7" },
            "status": { "privacyStatus": "public", "license": "youtube", "embeddable": true },
            "topicDetails": { "topicCategories": ["https://en.wikipedia.org/wiki/Music"] },
            "liveStreamingDetails": { "actualStartTime": "2023-01-01T17:00:00Z" },
            "paidProductPlacementDetails": { "hasPaidProductPlacement": false }
        }));
        let r = MetadataRecord::from_api(v, now()).unwrap();
        assert_eq!("abc123", r.video_id);
        assert_eq!("My Video", r.title);
        assert_eq!(
            Some("https://i.ytimg.com/vi/abc123/maxresdefault.jpg"),
            r.thumbnail_url.as_deref()
        );
        assert_eq!(vec!["a", "b"], r.tags);
        assert_eq!(Some(253), r.duration_seconds);
        assert_eq!(Some(1234), r.view_count);
        assert_eq!(Some(56), r.like_count);
        assert_eq!(Some(7), r.comment_count);
        assert_eq!(Some(true), r.embeddable);
        assert!(r.was_livestream);
        assert_eq!(
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 17, 0, 0).unwrap()),
            r.actual_start_time
        );
        assert_eq!(None, r.actual_end_time);
        assert_eq!(Some(false), r.has_paid_product_placement);
        assert_eq!(now(), r.metadata_updated_at);
    }

    #[test]
    fn counters_are_never_negative_or_placeholders() {
        let v = video(json!({
            "kind": "youtube#video",
            "id": "x",
            "snippet": { "title": "t" },
            "contentDetails": { "duration": "PT1S" },
            "statistics": { "viewCount": "-5", "likeCount": "n/a", "commentCount": 12 }
        }));
        let r = MetadataRecord::from_api(v, now()).unwrap();
        assert_eq!(None, r.view_count);
        assert_eq!(None, r.like_count);
        assert_eq!(Some(12), r.comment_count);
    }

    #[test]
    fn missing_facets_are_absent() {
        let v = video(json!({
            "kind": "youtube#video",
            "id": "x",
            "snippet": { "title": "t", "publishedAt": "not a date" },
            "contentDetails": {}
        }));
        let r = MetadataRecord::from_api(v, now()).unwrap();
        assert_eq!(None, r.view_count);
        assert_eq!(None, r.published_at);
        assert_eq!(None, r.thumbnail_url);
        assert!(r.topic_categories.is_empty());
        assert!(!r.was_livestream);
    }

    #[test]
    fn non_videos_are_rejected() {
        let v = video(json!({
            "kind": "youtube#playlist",
            "id": "x",
            "snippet": { "title": "t" },
            "contentDetails": {}
        }));
        assert!(MetadataRecord::from_api(v, now()).is_none());

        let v = video(json!({ "kind": "youtube#video", "id": "x", "snippet": { "title": "t" } }));
        assert!(MetadataRecord::from_api(v, now()).is_none());
    }

    #[test]
    fn record_serializes_camel_case() {
        let r = MetadataRecord {
            video_id: "abc".into(),
            view_count: Some(3),
            ..Default::default()
        };
        let j = serde_json::to_value(&r).unwrap();
        assert_eq!("abc", j["videoId"]);
        assert_eq!(3, j["viewCount"]);
        assert!(j["likeCount"].is_null());
        assert!(j.get("metadataUpdatedAt").is_some());
    }

    #[test]
    fn fetch_failure_shapes() {
        let item = FetchFailure::Item {
            video_id: "a".into(),
            error: "Invalid video data format".into(),
        };
        assert_eq!(
            json!({ "video_id": "a", "error": "Invalid video data format" }),
            serde_json::to_value(&item).unwrap()
        );
        let chunk = FetchFailure::Chunk {
            video_ids: vec!["a".into(), "b".into()],
            error: "quota".into(),
        };
        assert_eq!(
            json!({ "video_ids": ["a", "b"], "error": "quota" }),
            serde_json::to_value(&chunk).unwrap()
        );
    }

    #[test]
    fn channel_id_from_url() {
        let mut e = HistoryEntry {
            title: "t".into(),
            url: "https://www.youtube.com/watch?v=a".into(),
            video_id: Some("a".into()),
            channel_title: Some("c".into()),
            channel_url: Some("https://www.youtube.com/channel/UC123".into()),
            watched_at: None,
            platform: PLATFORM.into(),
        };
        assert_eq!(Some("UC123"), e.channel_id());
        e.channel_url = Some("https://www.youtube.com/@handle".into());
        assert_eq!(None, e.channel_id());
        e.channel_url = None;
        assert_eq!(None, e.channel_id());
    }

    #[test]
    fn watch_rows_dedup_videos() {
        let entry = |id: &str, title: &str| WatchEntry {
            video_id: id.into(),
            title: title.into(),
            channel_id: None,
            channel_title: None,
            watched_at: now(),
        };
        let rows = WatchRows::from(vec![
            entry("a", "first"),
            entry("b", "other"),
            entry("a", "second"),
        ]);
        assert_eq!(2, rows.num_videos());
        assert_eq!(3, rows.num_watches());
        assert_eq!(vec!["first", "other"], rows.titles);
        assert_eq!(vec!["a", "b", "a"], rows.watch_video_ids);
    }
}
