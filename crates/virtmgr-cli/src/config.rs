//! Config file discovery

use std::path::{Path, PathBuf};

/// Used when no other candidate exists
pub const DEFAULT_CONFIG_PATH: &str = "/etc/virtmgr/config.toml";

/// Pick the config file to load
///
/// An explicit path (flag or `VIRTMGR_CONFIG`) always wins. Otherwise the
/// first existing candidate is used: `./virtmgr.toml`, then the per-user
/// config directory, falling back to the system path.
#[must_use]
pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
    let candidates = [
        Some(PathBuf::from("virtmgr.toml")),
        dirs::config_dir().map(|p| p.join("virtmgr/config.toml")),
    ];
    resolve_from(explicit, candidates.into_iter().flatten())
}

fn resolve_from(explicit: Option<PathBuf>, candidates: impl IntoIterator<Item = PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    candidates
        .into_iter()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH).to_path_buf())
}
