#![forbid(unsafe_code)]

//! Subtitle acquisition service library.
//!
//! The crate exposes the pieces the `backend` binary wires together: a
//! yt-dlp driven subtitle downloader, a YouTube Data API metadata client, a
//! WebVTT-to-text converter, a TTL+LRU response cache, and the pipeline that
//! orchestrates them per request.

pub mod cache;
pub mod captions;
pub mod config;
pub mod downloader;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod security;
pub mod webpage;
