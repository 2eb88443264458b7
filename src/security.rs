//! Security helpers for the subfetch binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The service shells out to
/// yt-dlp with caller-influenced arguments and writes into a shared
/// downloads directory, so it is expected to run under a dedicated,
/// unprivileged account.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; use a dedicated service account");
    }
    Ok(())
}
