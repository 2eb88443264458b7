//! Web page retrieval and visible-text extraction.
//!
//! Thin collaborator next to the subtitle pipeline: performs a browser-like
//! GET with a small retry policy, drops `<script>`/`<style>` elements and
//! all remaining markup, and collapses the result into non-empty lines.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, SubfetchError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

const MAX_ATTEMPTS: usize = 3;
const BACKOFF_UNIT: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Status codes worth another attempt: rate limiting and upstream hiccups.
const RETRYABLE_STATUS: &[u16] = &[429, 500, 502, 503, 504];

/// Blocking page fetcher; run it under `spawn_blocking` from async code.
pub struct PageFetcher {
    agent: ureq::Agent,
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build();
        Self { agent }
    }

    /// Fetches `url` and returns its visible text. Retries transient
    /// failures with doubling backoff (1s, 2s) before giving up.
    pub fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                thread::sleep(BACKOFF_UNIT * (1 << (attempt - 1)));
            }

            match self
                .agent
                .get(url)
                .set("User-Agent", USER_AGENT)
                .set("Accept", ACCEPT)
                .set("Accept-Language", ACCEPT_LANGUAGE)
                .call()
            {
                Ok(response) => {
                    let body = response
                        .into_string()
                        .map_err(|err| SubfetchError::Unexpected(format!("reading {url}: {err}")))?;
                    return Ok(extract_visible_text(&body));
                }
                Err(ureq::Error::Status(code, _)) if RETRYABLE_STATUS.contains(&code) => {
                    warn!("fetching {url} returned status {code}, retrying");
                    last_error = format!("status {code}");
                }
                Err(ureq::Error::Status(code, _)) => {
                    return Err(SubfetchError::Unexpected(format!(
                        "fetching {url}: status {code}"
                    )));
                }
                Err(err) => {
                    warn!("fetching {url} failed: {err}, retrying");
                    last_error = err.to_string();
                }
            }
        }

        Err(SubfetchError::Unexpected(format!(
            "fetching {url}: {last_error}"
        )))
    }
}

/// Strips markup from an HTML document, keeping only the text a reader
/// would see: script and style contents removed, tags dropped, common
/// entities decoded, blank lines collapsed.
pub fn extract_visible_text(html: &str) -> String {
    let without_scripts = remove_elements(html, "script");
    let without_styles = remove_elements(&without_scripts, "style");
    let text = strip_tags(&without_styles);
    let decoded = decode_entities(&text);

    let mut chunks: Vec<&str> = Vec::new();
    for line in decoded.lines() {
        for phrase in line.trim().split("  ") {
            let phrase = phrase.trim();
            if !phrase.is_empty() {
                chunks.push(phrase);
            }
        }
    }
    chunks.join("\n")
}

/// Removes `<tag ...>...</tag>` spans, matching case-insensitively. An
/// unterminated element swallows the rest of the document, which matches
/// how browsers treat a dangling script block.
fn remove_elements(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let lowered = html.to_ascii_lowercase();

    let mut result = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some(offset) = lowered[cursor..].find(&open) {
        let start = cursor + offset;
        result.push_str(&html[cursor..start]);
        match lowered[start..].find(&close) {
            Some(end) => cursor = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&html[cursor..]);
    result
}

fn strip_tags(html: &str) -> String {
    let mut cleaned = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => cleaned.push(ch),
            _ => {}
        }
    }
    cleaned
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
