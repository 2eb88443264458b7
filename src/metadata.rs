//! Video metadata lookup against the YouTube Data API v3.
//!
//! The structs in this module mirror the provider's JSON layout: `snippet`
//! for descriptive fields, `statistics` for the counters (which the API
//! returns as decimal strings), and `contentDetails` for the ISO-8601
//! duration. A video id that matches no record yields `Ok(None)` rather than
//! an error; only transport and decoding problems surface as failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubfetchError};

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata for a single video, flattened from the provider's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub channel_title: String,
    pub published_at: String,
    pub view_count: String,
    pub like_count: String,
    pub comment_count: String,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
    statistics: Statistics,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "channelTitle")]
    channel_title: String,
    #[serde(rename = "publishedAt")]
    published_at: String,
}

/// Counters are strings in the provider's JSON; some are omitted entirely
/// when the uploader hides them, so every field defaults to empty.
#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount", default)]
    view_count: String,
    #[serde(rename = "likeCount", default)]
    like_count: String,
    #[serde(rename = "commentCount", default)]
    comment_count: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

impl From<VideoItem> for VideoDetails {
    fn from(item: VideoItem) -> Self {
        VideoDetails {
            title: item.snippet.title,
            description: item.snippet.description,
            channel_title: item.snippet.channel_title,
            published_at: item.snippet.published_at,
            view_count: item.statistics.view_count,
            like_count: item.statistics.like_count,
            comment_count: item.statistics.comment_count,
            duration: item.content_details.duration,
        }
    }
}

/// Seam between the orchestrator and the concrete provider client, so tests
/// can substitute canned lookups without touching the network.
pub trait DetailsProvider: Send + Sync {
    fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>>;
}

/// Blocking YouTube Data API client. Calls are expected to run under
/// `spawn_blocking` so they never stall the async request path.
pub struct MetadataClient {
    agent: ureq::Agent,
    api_key: String,
}

impl MetadataClient {
    pub fn new(api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self { agent, api_key }
    }
}

impl DetailsProvider for MetadataClient {
    fn video_details(&self, video_id: &str) -> Result<Option<VideoDetails>> {
        let response = self
            .agent
            .get(VIDEOS_ENDPOINT)
            .query("part", "snippet,statistics,contentDetails")
            .query("id", video_id)
            .query("key", &self.api_key)
            .call()
            .map_err(|err| SubfetchError::Metadata(err.to_string()))?;

        let payload: VideoListResponse = response
            .into_json()
            .map_err(|err| SubfetchError::Metadata(format!("decoding provider response: {err}")))?;

        Ok(payload.items.into_iter().next().map(VideoDetails::from))
    }
}
