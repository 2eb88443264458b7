//! Error taxonomy shared by the pipeline and the HTTP layer.
//!
//! Every failure the service can surface maps onto one of these variants so
//! the backend binary can translate them into the structured error envelope
//! without inspecting error strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubfetchError {
    /// The request carried a video id that is not exactly 11 characters.
    /// Never retried, always a client error.
    #[error("Invalid YouTube video ID format")]
    InvalidVideoId(String),

    /// yt-dlp reported a fatal condition (or exhausted its rate-limit
    /// retries). Carries the captured stderr for diagnostics.
    #[error("Error executing yt-dlp: {stderr}")]
    Download { stderr: String },

    /// The YouTube Data API lookup failed. The orchestrator downgrades this
    /// to an absent-metadata outcome instead of failing the request.
    #[error("Error fetching video details: {0}")]
    Metadata(String),

    /// The downloaded caption file could not be interpreted as WebVTT.
    /// Fatal to the transcript field only.
    #[error("Malformed caption file: {0}")]
    MalformedCaptions(String),

    /// Anything else: filesystem trouble, a subprocess that would not spawn,
    /// a web page that stayed unreachable after retries.
    #[error("Error processing request: {0}")]
    Unexpected(String),
}

impl From<std::io::Error> for SubfetchError {
    fn from(err: std::io::Error) -> Self {
        SubfetchError::Unexpected(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SubfetchError>;
