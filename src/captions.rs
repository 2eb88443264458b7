//! WebVTT caption conversion.
//!
//! yt-dlp writes auto-generated captions as WebVTT: a `WEBVTT` header line,
//! then repeated cue blocks made of an optional identifier line, a
//! `start --> end` timestamp line, and one or more text lines. The pipeline
//! only needs the spoken text, so this module flattens a caption file into a
//! newline-joined transcript: header, identifiers and timestamps discarded,
//! text lines trimmed, order preserved, duplicates kept.

use std::fs;
use std::path::Path;

use crate::error::{Result, SubfetchError};

/// Reads a caption file from disk and converts it to plain text.
pub fn vtt_to_text(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)?;
    parse_transcript(&content)
}

/// Converts WebVTT markup to a flat transcript.
///
/// Fails with [`SubfetchError::MalformedCaptions`] when the content does not
/// carry the mandatory `WEBVTT` header. Everything after the header is
/// handled leniently: NOTE/STYLE/REGION blocks are skipped, and any line
/// between a timestamp line and the next blank line counts as cue text.
pub fn parse_transcript(content: &str) -> Result<String> {
    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| SubfetchError::MalformedCaptions("empty caption file".into()))?;

    // yt-dlp occasionally emits a UTF-8 BOM before the header.
    let header = header.trim_start_matches('\u{feff}');
    if !header.starts_with("WEBVTT") {
        return Err(SubfetchError::MalformedCaptions(
            "missing WEBVTT header".into(),
        ));
    }

    let mut texts: Vec<String> = Vec::new();
    let mut in_cue_text = false;
    let mut in_comment = false;

    for line in lines {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            in_cue_text = false;
            in_comment = false;
            continue;
        }

        if in_comment {
            continue;
        }

        if trimmed.contains("-->") {
            in_cue_text = true;
            continue;
        }

        if in_cue_text {
            let text = strip_cue_tags(trimmed);
            let text = text.trim();
            if !text.is_empty() {
                texts.push(text.to_owned());
            }
            continue;
        }

        // Non-cue payload: NOTE/STYLE/REGION blocks span until the next
        // blank line; anything else is a cue identifier or header metadata
        // and is dropped.
        if trimmed.starts_with("NOTE") || trimmed.starts_with("STYLE") || trimmed.starts_with("REGION")
        {
            in_comment = true;
        }
    }

    Ok(texts.join("\n"))
}

/// Removes inline WebVTT tags such as `<v Speaker>`, `<i>` or karaoke
/// timestamps, keeping only the visible characters.
fn strip_cue_tags(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => cleaned.push(ch),
            _ => {}
        }
    }
    cleaned
}
