use super::MetadataSource;
use crate::{
    Result,
    client::Client,
    models::api::{Video, VideoListResponse},
};
use tracing::trace;
use url::Url;

pub static DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Every facet that goes into a MetadataRecord
pub static PARTS: &str = "snippet,contentDetails,statistics,status,topicDetails,recordingDetails,liveStreamingDetails,paidProductPlacementDetails";

/// The videos.list endpoint of the YouTube Data API v3
#[derive(Clone)]
pub struct YouTubeSource {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl YouTubeSource {
    pub fn new(client: Client, api_key: impl Into<String>, base_url: Url) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url,
        }
    }

    fn request_url(&self, ids: &[String]) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("part", PARTS)
            .append_pair("id", &ids.join(","))
            .append_pair("key", &self.api_key);
        url
    }
}

impl MetadataSource for YouTubeSource {
    fn name(&self) -> &'static str {
        "YouTubeSource"
    }

    async fn list_videos(&self, ids: &[String]) -> Result<Vec<Video>> {
        trace!(ids = ids.len(), "Requesting videos.list");
        let res: VideoListResponse = self.client.get_json(self.request_url(ids)).await?;
        Ok(res.items)
    }
}

// api key stays out of logs
impl std::fmt::Debug for YouTubeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeSource")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
