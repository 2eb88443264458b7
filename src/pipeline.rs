//! Per-request orchestration of the subtitle acquisition pipeline.
//!
//! `acquire` validates the video id, consults the response cache, then runs
//! the subtitle download and the metadata lookup as a fork-join pair:
//! the yt-dlp future and the blocking provider call proceed concurrently and
//! both always run to completion. Missing subtitles or missing metadata are
//! degraded-but-successful outcomes; only a fatal downloader error turns the
//! whole request into an error response.
//!
//! Known limitation: two concurrent requests for the same id before the
//! first completes will both invoke the downloader. They race on the same
//! id-scoped output file and at worst duplicate work; the cache write is
//! last-one-wins with identical content.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task;
use tracing::{info, warn};

use crate::cache::TtlLruCache;
use crate::captions;
use crate::downloader::{SubtitleDownloader, find_subtitle_file};
use crate::error::{Result, SubfetchError};
use crate::metadata::{DetailsProvider, VideoDetails};

/// YouTube video ids are always 11 characters.
pub const VIDEO_ID_LEN: usize = 11;

const CACHE_KEY_PREFIX: &str = "subtitles_";

/// Incoming request body for the subtitle endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleRequest {
    pub video_id: String,
    pub video_url: String,
}

/// Wire-format response. Both success and error payloads nest under
/// `detail`, mirroring the envelope callers of this service already expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    pub detail: ResponseDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDetail {
    pub status: String,
    pub message: String,
    pub data: Value,
}

impl ResponseDocument {
    /// Builds the success document for a request. Missing subtitles or
    /// metadata only change the message; the status stays `success` because
    /// "no content found" is a valid terminal outcome.
    pub fn success(
        request: &SubtitleRequest,
        transcript: Option<String>,
        details: Option<VideoDetails>,
    ) -> Self {
        let message = match (&transcript, &details) {
            (Some(_), _) => "Subtitles downloaded and cleaned successfully",
            (None, Some(_)) => "Subtitles not found, but video details fetched successfully",
            (None, None) => "Neither subtitles nor video details found",
        };

        let details_value = details
            .and_then(|details| serde_json::to_value(details).ok())
            .unwrap_or_else(|| json!({}));

        let mut data = serde_json::Map::new();
        data.insert("video_id".into(), json!(request.video_id));
        data.insert("video_url".into(), json!(request.video_url));
        if let Some(transcript) = transcript {
            data.insert("subtitles".into(), Value::String(transcript));
        }
        data.insert("video_details".into(), details_value);

        Self {
            detail: ResponseDetail {
                status: "success".into(),
                message: message.into(),
                data: Value::Object(data),
            },
        }
    }
}

pub fn valid_video_id(video_id: &str) -> bool {
    video_id.chars().count() == VIDEO_ID_LEN
}

/// Orchestrates downloader, metadata fetcher, parser and cache for one
/// request at a time. Shared across requests behind an `Arc`.
pub struct SubtitlePipeline {
    downloader: SubtitleDownloader,
    details: Arc<dyn DetailsProvider>,
    cache: TtlLruCache<ResponseDocument>,
    downloads_dir: PathBuf,
}

impl SubtitlePipeline {
    pub fn new(
        downloader: SubtitleDownloader,
        details: Arc<dyn DetailsProvider>,
        downloads_dir: PathBuf,
    ) -> Self {
        Self {
            downloader,
            details,
            cache: TtlLruCache::with_defaults(),
            downloads_dir,
        }
    }

    /// Replaces the default cache, used by tests to shrink capacity and TTL.
    pub fn with_cache(mut self, cache: TtlLruCache<ResponseDocument>) -> Self {
        self.cache = cache;
        self
    }

    /// Runs the full acquisition pipeline for one request.
    pub async fn acquire(&self, request: &SubtitleRequest) -> Result<ResponseDocument> {
        if !valid_video_id(&request.video_id) {
            return Err(SubfetchError::InvalidVideoId(request.video_id.clone()));
        }

        let cache_key = format!("{CACHE_KEY_PREFIX}{}", request.video_id);
        if let Some(cached) = self.cache.get(&cache_key) {
            info!("cache hit for video id {}", request.video_id);
            return Ok(cached);
        }

        tokio::fs::create_dir_all(&self.downloads_dir).await?;

        // Fork-join: the subprocess download and the blocking provider call
        // run concurrently and both complete before reconciliation.
        let provider = self.details.clone();
        let video_id = request.video_id.clone();
        let details_task = task::spawn_blocking(move || provider.video_details(&video_id));
        let download = self.downloader.download(&request.video_id, &self.downloads_dir);

        let (downloaded, fetched) = tokio::join!(download, details_task);

        // Downloader errors are fatal for the request; they already went
        // through the retry budget.
        downloaded?;

        let details = match fetched {
            Ok(Ok(details)) => details,
            Ok(Err(err)) => {
                warn!("metadata lookup failed for {}: {err}", request.video_id);
                None
            }
            Err(err) => {
                warn!("metadata task failed for {}: {err}", request.video_id);
                None
            }
        };

        let transcript = match find_subtitle_file(&self.downloads_dir, &request.video_id) {
            Some(path) => match captions::vtt_to_text(&path) {
                Ok(text) => Some(text),
                Err(err) => {
                    // Fatal to the transcript only; metadata still goes out.
                    warn!("caption file for {} unusable: {err}", request.video_id);
                    None
                }
            },
            None => None,
        };

        let response = ResponseDocument::success(request, transcript, details);
        self.cache.put(cache_key, response.clone());
        Ok(response)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cache::TtlLruCache;
    use crate::downloader::RetryPolicy;
    use std::fs;
    use std::num::NonZeroUsize;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const VALID_ID: &str = "dQw4w9WgXcQ";

    /// Canned provider that counts lookups.
    struct StubProvider {
        details: Option<VideoDetails>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubProvider {
        fn with_details(details: Option<VideoDetails>) -> Arc<Self> {
            Arc::new(Self {
                details,
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                details: None,
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    impl DetailsProvider for StubProvider {
        fn video_details(&self, _video_id: &str) -> Result<Option<VideoDetails>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SubfetchError::Metadata("quota exceeded".into()));
            }
            Ok(self.details.clone())
        }
    }

    fn sample_details() -> VideoDetails {
        VideoDetails {
            title: "Sample Video".into(),
            description: "desc".into(),
            channel_title: "Sample Channel".into(),
            published_at: "2009-10-25T06:57:33Z".into(),
            view_count: "1000000".into(),
            like_count: "50000".into(),
            comment_count: "1200".into(),
            duration: "PT3M33S".into(),
        }
    }

    fn request() -> SubtitleRequest {
        SubtitleRequest {
            video_id: VALID_ID.into(),
            video_url: format!("https://www.youtube.com/watch?v={VALID_ID}"),
        }
    }

    /// Executable yt-dlp stand-in with an invocation counter baked in.
    fn install_stub(dir: &Path, body: &str) -> PathBuf {
        let count_file = dir.join("attempts");
        let script_path = dir.join("yt-dlp");
        let script = format!(
            "#!/usr/bin/env bash\n\
             count_file=\"{count}\"\n\
             attempts=$(cat \"$count_file\" 2>/dev/null || echo 0)\n\
             attempts=$((attempts + 1))\n\
             echo \"$attempts\" > \"$count_file\"\n\
             {body}\n",
            count = count_file.display(),
        );
        fs::write(&script_path, script).unwrap();
        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();
        script_path
    }

    fn stub_invocations(dir: &Path) -> usize {
        fs::read_to_string(dir.join("attempts"))
            .unwrap_or_default()
            .trim()
            .parse()
            .unwrap_or(0)
    }

    fn pipeline(
        dir: &TempDir,
        stub: PathBuf,
        provider: Arc<StubProvider>,
    ) -> SubtitlePipeline {
        let downloader = SubtitleDownloader::new(stub, dir.path().join("cookies.txt"))
            .with_policy(RetryPolicy {
                max_attempts: 3,
                backoff_unit: Duration::from_millis(5),
            });
        SubtitlePipeline::new(downloader, provider, dir.path().join("downloads"))
    }

    fn writing_stub(dir: &TempDir, vtt_content: &str) -> PathBuf {
        let vtt = dir.path().join("downloads").join(format!("{VALID_ID}.en.vtt"));
        install_stub(
            dir.path(),
            &format!(
                "mkdir -p \"{dir}\"\nprintf '{content}' > \"{vtt}\"\nexit 0",
                dir = vtt.parent().unwrap().display(),
                content = vtt_content,
                vtt = vtt.display()
            ),
        )
    }

    #[tokio::test]
    async fn short_id_fails_with_zero_downstream_calls() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(Some(sample_details()));
        let stub = install_stub(dir.path(), "exit 0");
        let pipeline = pipeline(&dir, stub, provider.clone());

        let mut bad = request();
        bad.video_id = "short".into();
        let err = pipeline.acquire(&bad).await.unwrap_err();

        assert!(matches!(err, SubfetchError::InvalidVideoId(_)));
        assert_eq!(stub_invocations(dir.path()), 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_id_fails_the_same_way() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(None);
        let stub = install_stub(dir.path(), "exit 0");
        let pipeline = pipeline(&dir, stub, provider);

        let mut bad = request();
        bad.video_id = String::new();
        assert!(matches!(
            pipeline.acquire(&bad).await.unwrap_err(),
            SubfetchError::InvalidVideoId(_)
        ));
    }

    #[tokio::test]
    async fn full_success_carries_transcript_and_details() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(Some(sample_details()));
        let stub = writing_stub(&dir, "WEBVTT\\n\\n00:00:01.000 --> 00:00:02.000\\nHello world\\n");
        let pipeline = pipeline(&dir, stub, provider);

        let document = pipeline.acquire(&request()).await.unwrap();
        assert_eq!(document.detail.status, "success");
        assert_eq!(document.detail.data["subtitles"], "Hello world");
        assert_eq!(document.detail.data["video_id"], VALID_ID);
        assert_eq!(document.detail.data["video_details"]["title"], "Sample Video");
        assert_eq!(document.detail.data["video_details"]["viewCount"], "1000000");
    }

    #[tokio::test]
    async fn absent_provider_record_yields_empty_details_object() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(None);
        let stub = writing_stub(&dir, "WEBVTT\\n\\n00:00:01.000 --> 00:00:02.000\\nHello world\\n");
        let pipeline = pipeline(&dir, stub, provider);

        let document = pipeline.acquire(&request()).await.unwrap();
        assert_eq!(document.detail.status, "success");
        assert_eq!(document.detail.data["subtitles"], "Hello world");
        assert_eq!(document.detail.data["video_details"], json!({}));
    }

    #[tokio::test]
    async fn no_subtitles_is_degraded_success_with_details() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(Some(sample_details()));
        let stub = install_stub(dir.path(), "exit 0");
        let pipeline = pipeline(&dir, stub, provider);

        let document = pipeline.acquire(&request()).await.unwrap();
        assert_eq!(document.detail.status, "success");
        assert_eq!(
            document.detail.message,
            "Subtitles not found, but video details fetched successfully"
        );
        assert!(document.detail.data.get("subtitles").is_none());
        assert_eq!(document.detail.data["video_details"]["title"], "Sample Video");
    }

    #[tokio::test]
    async fn nothing_found_is_still_success() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::failing();
        let stub = install_stub(dir.path(), "exit 0");
        let pipeline = pipeline(&dir, stub, provider.clone());

        let document = pipeline.acquire(&request()).await.unwrap();
        assert_eq!(document.detail.status, "success");
        assert_eq!(
            document.detail.message,
            "Neither subtitles nor video details found"
        );
        assert_eq!(document.detail.data["video_details"], json!({}));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_result_skips_the_downloader() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(Some(sample_details()));
        let stub = writing_stub(&dir, "WEBVTT\\n\\n00:00:01.000 --> 00:00:02.000\\ncached\\n");
        let pipeline = pipeline(&dir, stub, provider.clone());

        let first = pipeline.acquire(&request()).await.unwrap();
        let second = pipeline.acquire(&request()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(stub_invocations(dir.path()), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_cache_entry_reruns_the_pipeline() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(None);
        let stub = install_stub(dir.path(), "exit 0");
        let cache = TtlLruCache::new(NonZeroUsize::new(10).unwrap(), Duration::from_millis(10));
        let pipeline = pipeline(&dir, stub, provider).with_cache(cache);

        pipeline.acquire(&request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        pipeline.acquire(&request()).await.unwrap();

        assert_eq!(stub_invocations(dir.path()), 2);
    }

    #[tokio::test]
    async fn downloader_failure_is_fatal_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(Some(sample_details()));
        let stub = install_stub(dir.path(), "echo 'ERROR: disk full' >&2\nexit 1");
        let pipeline = pipeline(&dir, stub, provider);

        let err = pipeline.acquire(&request()).await.unwrap_err();
        assert!(matches!(err, SubfetchError::Download { .. }));

        // The failed outcome was not cached, so the downloader runs again.
        let before = stub_invocations(dir.path());
        let _ = pipeline.acquire(&request()).await;
        assert!(stub_invocations(dir.path()) > before);
    }

    #[tokio::test]
    async fn malformed_captions_drop_the_transcript_but_keep_details() {
        let dir = TempDir::new().unwrap();
        let provider = StubProvider::with_details(Some(sample_details()));
        let stub = writing_stub(&dir, "not a caption file at all\\n");
        let pipeline = pipeline(&dir, stub, provider);

        let document = pipeline.acquire(&request()).await.unwrap();
        assert_eq!(document.detail.status, "success");
        assert!(document.detail.data.get("subtitles").is_none());
        assert_eq!(document.detail.data["video_details"]["title"], "Sample Video");
    }

    #[test]
    fn id_validation_requires_exactly_eleven_chars() {
        assert!(valid_video_id(VALID_ID));
        assert!(!valid_video_id(""));
        assert!(!valid_video_id("0123456789"));
        assert!(!valid_video_id("0123456789ab"));
    }
}
