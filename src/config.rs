//! Runtime configuration sourced from the process environment.
//!
//! Everything except the YouTube API key has a sensible default. The key is
//! deliberately a hard startup requirement: without it every metadata lookup
//! would fail, so the process refuses to boot rather than limp along.

use anyhow::{Result, anyhow};
use std::{
    env,
    path::{Path, PathBuf},
};

pub const API_KEY_VAR: &str = "YOUTUBE_API_KEY";
pub const HOST_VAR: &str = "SUBFETCH_HOST";
pub const PORT_VAR: &str = "SUBFETCH_PORT";
pub const DOWNLOADS_DIR_VAR: &str = "SUBFETCH_DOWNLOADS_DIR";
pub const COOKIES_VAR: &str = "SUBFETCH_COOKIES";
pub const YTDLP_VAR: &str = "SUBFETCH_YTDLP";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
pub const DEFAULT_YTDLP: &str = "yt-dlp";

/// Well-known install locations probed when no explicit yt-dlp path is
/// configured. Falls back to resolution via PATH.
const YTDLP_CANDIDATES: &[&str] = &[
    "/usr/local/bin/yt-dlp",
    "/opt/homebrew/bin/yt-dlp",
    "/usr/bin/yt-dlp",
];

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_key: String,
    pub host: String,
    pub port: u16,
    pub downloads_dir: PathBuf,
    pub cookies_file: PathBuf,
    pub ytdlp_path: PathBuf,
}

/// Reads the configuration from the process environment.
pub fn load_runtime_config() -> Result<RuntimeConfig> {
    load_runtime_config_from(|name| env::var(name).ok())
}

/// Same as [`load_runtime_config`], but with an injectable variable lookup
/// so tests do not have to mutate global process state.
pub fn load_runtime_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig> {
    let api_key = lookup(API_KEY_VAR)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("{API_KEY_VAR} environment variable is not set"))?;

    let host = lookup(HOST_VAR).unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match lookup(PORT_VAR) {
        Some(value) => value
            .parse::<u16>()
            .map_err(|err| anyhow!("parsing {PORT_VAR}={value}: {err}"))?,
        None => DEFAULT_PORT,
    };

    let downloads_dir = lookup(DOWNLOADS_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_DIR));
    let cookies_file = lookup(COOKIES_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIES_FILE));
    let ytdlp_path = resolve_ytdlp_path(lookup(YTDLP_VAR));

    Ok(RuntimeConfig {
        api_key,
        host,
        port,
        downloads_dir,
        cookies_file,
        ytdlp_path,
    })
}

/// Picks the yt-dlp binary: an explicit override wins, then the first
/// well-known install location that exists, then the bare command name so
/// PATH resolution can take over.
fn resolve_ytdlp_path(configured: Option<String>) -> PathBuf {
    if let Some(path) = configured.filter(|value| !value.is_empty()) {
        return PathBuf::from(path);
    }
    for candidate in YTDLP_CANDIDATES {
        let path = Path::new(candidate);
        if path.exists() {
            return path.to_path_buf();
        }
    }
    PathBuf::from(DEFAULT_YTDLP)
}
