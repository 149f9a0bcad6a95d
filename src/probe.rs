//! Track listing for the `probe` command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracklift_core::{AssetAdapter, TrackMeta};
use tracklift_media::Mp4Asset;

/// What `tracklift probe` reports about a file.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub file_path: PathBuf,
    pub file_size: u64,
    /// Movie duration in seconds.
    pub duration: f64,
    /// Whether `moov` precedes `mdat`.
    pub faststart: bool,
    /// Largest gap between video keyframes, in seconds.
    pub max_keyframe_interval: Option<f64>,
    pub tracks: Vec<TrackMeta>,
}

/// Parse `path` and describe its tracks.
pub fn probe_file(path: &Path) -> Result<ProbeReport> {
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {:?}", path))?
        .len();
    let asset = Mp4Asset::open(path)?;
    let tracks = asset.track_list()?;
    let mp4 = asset.file();

    tracing::debug!(path = ?path, tracks = tracks.len(), "Probed file");

    Ok(ProbeReport {
        file_path: path.to_path_buf(),
        file_size,
        duration: mp4.duration_secs(),
        faststart: mp4.has_faststart,
        max_keyframe_interval: mp4.max_keyframe_interval_secs(),
        tracks,
    })
}
