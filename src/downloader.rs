//! yt-dlp driven subtitle download with retry and outcome classification.
//!
//! The downloader shells out to yt-dlp once per attempt, requesting only the
//! auto-generated caption track (`--skip-download`), and decides what
//! happened from the exit code and the captured stderr. The string patterns
//! are a contract against yt-dlp's unversioned diagnostics, so all of the
//! matching lives in [`classify_outcome`] and nowhere else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, SubfetchError};

/// Attempts made before giving up on a rate-limited or flaky invocation.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Base backoff unit; attempt `n` (zero-indexed) waits `(n + 1)` units,
/// giving 10s, 20s, 30s with the default.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(10);

/// Closed classification of one yt-dlp invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Exit 0, or stderr shows the subtitle file was written.
    Success,
    /// yt-dlp complained that the video format is unavailable. Irrelevant
    /// when only captions were requested, as long as the file exists.
    SoftSuccess,
    /// Upstream rate limiting; worth retrying after a pause.
    RateLimited,
    /// Anything else. Shares the retry budget but gets no backoff pause.
    Fatal,
}

/// Maps exit status plus captured stderr onto [`DownloadOutcome`], checked
/// in priority order. This is the only place that inspects yt-dlp's message
/// strings.
pub fn classify_outcome(exit_ok: bool, stderr: &str) -> DownloadOutcome {
    if exit_ok
        || stderr.contains("Writing video subtitles")
        || (stderr.contains("Destination:") && stderr.contains(".vtt"))
    {
        return DownloadOutcome::Success;
    }

    if stderr.contains("Requested format is not available") {
        return DownloadOutcome::SoftSuccess;
    }

    let lowered = stderr.to_lowercase();
    if lowered.contains("429") || lowered.contains("too many requests") {
        return DownloadOutcome::RateLimited;
    }

    DownloadOutcome::Fatal
}

/// Retry budget and backoff applied to rate-limited and unexpected
/// failures. Injectable so tests run with millisecond waits.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}

impl RetryPolicy {
    /// Attempt-indexed backoff: 1x, 2x, 3x the unit.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.backoff_unit * (attempt as u32 + 1)
    }
}

/// Invokes yt-dlp to fetch the auto-generated caption track for a video.
pub struct SubtitleDownloader {
    ytdlp_path: PathBuf,
    cookies_file: PathBuf,
    policy: RetryPolicy,
}

impl SubtitleDownloader {
    pub fn new(ytdlp_path: PathBuf, cookies_file: PathBuf) -> Self {
        Self {
            ytdlp_path,
            cookies_file,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Downloads the caption track for `video_id` into `output_dir`,
    /// producing `<output_dir>/<video_id>.<lang>.vtt` as a side effect.
    ///
    /// Returns immediately when a matching caption file is already on disk.
    /// Rate limiting and launch failures are retried with attempt-indexed
    /// backoff; other failures retry immediately within the same budget.
    pub async fn download(&self, video_id: &str, output_dir: &Path) -> Result<()> {
        if let Some(existing) = find_subtitle_file(output_dir, video_id) {
            debug!("subtitle file already exists: {}", existing.display());
            return Ok(());
        }

        let url = format!("https://www.youtube.com/watch?v={video_id}");
        let output_template = output_dir.join(video_id);

        for attempt in 0..self.policy.max_attempts {
            info!(
                "executing yt-dlp for {video_id} (attempt {}/{})",
                attempt + 1,
                self.policy.max_attempts
            );

            let output = match self.command(&url, &output_template).output().await {
                Ok(output) => output,
                Err(err) => {
                    warn!("failed to run {}: {err}", self.ytdlp_path.display());
                    if attempt + 1 == self.policy.max_attempts {
                        return Err(SubfetchError::Unexpected(format!(
                            "running {}: {err}",
                            self.ytdlp_path.display()
                        )));
                    }
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    continue;
                }
            };

            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

            match classify_outcome(output.status.success(), &stderr) {
                DownloadOutcome::Success => {
                    info!("yt-dlp subtitle download completed for {video_id}");
                    return Ok(());
                }
                DownloadOutcome::SoftSuccess => {
                    // The video payload was never wanted; the run counts as
                    // a success as long as the caption file landed.
                    if find_subtitle_file(output_dir, video_id).is_some() {
                        warn!("video format unavailable for {video_id}, but captions were written");
                        return Ok(());
                    }
                    if attempt + 1 < self.policy.max_attempts {
                        warn!("format unavailable and no caption file for {video_id}, retrying");
                        continue;
                    }
                    return Err(SubfetchError::Download { stderr });
                }
                DownloadOutcome::RateLimited => {
                    if attempt + 1 < self.policy.max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!("rate limited for {video_id}, waiting {delay:?} before retry");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(SubfetchError::Download { stderr });
                }
                DownloadOutcome::Fatal => {
                    // Generic subprocess failures share the retry budget but
                    // skip the rate-limit backoff.
                    if attempt + 1 < self.policy.max_attempts {
                        warn!("yt-dlp failed for {video_id}: {}", stderr.trim());
                        continue;
                    }
                    return Err(SubfetchError::Download { stderr });
                }
            }
        }

        Err(SubfetchError::Unexpected(
            "subtitle download retry budget exhausted".into(),
        ))
    }

    fn command(&self, url: &str, output_template: &Path) -> Command {
        let mut command = Command::new(&self.ytdlp_path);
        command
            .arg("--write-auto-sub")
            .arg("--sub-format")
            .arg("vtt")
            .arg("--skip-download")
            .arg("--output")
            .arg(output_template);

        if self.cookies_file.exists() {
            command.arg("--cookies").arg(&self.cookies_file);
        }

        command.arg(url);
        command
    }
}

/// Locates an already-downloaded caption file for `video_id`. yt-dlp appends
/// the language code itself, so any `<id>.<something>.vtt` counts.
pub fn find_subtitle_file(dir: &Path, video_id: &str) -> Option<PathBuf> {
    let prefix = format!("{video_id}.");
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with(".vtt") {
            return Some(entry.path());
        }
    }
    None
}
