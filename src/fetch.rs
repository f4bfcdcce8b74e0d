//! Batched lookup of video metadata from a [`MetadataSource`].

use crate::{
    Result,
    models::{FetchFailure, MetadataRecord, api},
};
use chrono::Utc;
use std::{collections::HashSet, time::Duration};
use tracing::{debug, error, info, warn};

pub mod youtube;

pub use youtube::YouTubeSource;

/// Upper bound of ids per request that the API accepts
pub const MAX_IDS_PER_REQUEST: usize = 50;

static INVALID_ITEM: &str = "Invalid video data format";

/// Something that can look up videos by id, e.g. the YouTube Data API
pub trait MetadataSource {
    fn name(&self) -> &'static str;

    /// Look up at most MAX_IDS_PER_REQUEST ids in one request. Ids the source does not know are
    /// simply missing from the result.
    async fn list_videos(&self, ids: &[String]) -> Result<Vec<api::Video>>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchOutcome {
    pub records: Vec<MetadataRecord>,
    pub failures: Vec<FetchFailure>,
    /// Requested ids the source did not return anything for
    pub missing: Vec<String>,
    /// Set if a chunk failed, and the remaining chunks were not requested
    pub aborted: bool,
}

#[derive(Debug, Clone)]
pub struct Fetcher<S> {
    source: S,
    chunk_size: usize,
    request_delay: Duration,
}

impl<S: MetadataSource> Fetcher<S> {
    pub fn new(source: S, chunk_size: usize, request_delay: Duration) -> Self {
        let clamped = chunk_size.clamp(1, MAX_IDS_PER_REQUEST);
        if clamped != chunk_size {
            warn!(chunk_size, clamped, "Chunk size out of range");
        }
        Self {
            source,
            chunk_size: clamped,
            request_delay,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fetch all ids, chunk by chunk, with request_delay between requests. The first failing
    /// chunk stops the run, but whatever was fetched before it is kept.
    pub async fn fetch(&self, ids: &[String]) -> FetchOutcome {
        let mut out = FetchOutcome::default();
        let num_chunks = ids.len().div_ceil(self.chunk_size);
        info!(
            source = self.source.name(),
            ids = ids.len(),
            chunks = num_chunks,
            "Fetching metadata"
        );

        for (i, chunk) in ids.chunks(self.chunk_size).enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            debug!(chunk = i + 1, of = num_chunks, size = chunk.len(), "Requesting chunk");

            let items = match self.source.list_videos(chunk).await {
                Ok(items) => items,
                Err(err) => {
                    error!(%err, ids = ?chunk, "Chunk request failed, skipping the rest");
                    out.failures.push(FetchFailure::Chunk {
                        video_ids: chunk.to_vec(),
                        error: err.to_string(),
                    });
                    out.aborted = true;
                    break;
                }
            };

            let fetched_at = Utc::now();
            let mut returned = HashSet::with_capacity(items.len());
            for item in items {
                let video_id = item.id.clone();
                returned.insert(video_id.clone());
                match MetadataRecord::from_api(item, fetched_at) {
                    Some(r) => out.records.push(r),
                    None => {
                        warn!(%video_id, "{}", INVALID_ITEM);
                        out.failures.push(FetchFailure::Item {
                            video_id,
                            error: INVALID_ITEM.to_string(),
                        });
                    }
                }
            }

            let missing: Vec<&String> = chunk.iter().filter(|id| !returned.contains(*id)).collect();
            if !missing.is_empty() {
                warn!(ids = ?missing, "Not returned by source");
                out.missing.extend(missing.into_iter().cloned());
            }
        }

        info!(
            records = out.records.len(),
            failures = out.failures.len(),
            missing = out.missing.len(),
            "Fetch done"
        );
        out
    }
}
