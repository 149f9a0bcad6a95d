//! Single-file import for the `import` command.
//!
//! Runs one session over an MP4 file and drains every track on the calling
//! thread, summarizing what came out of each queue.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracklift_core::config::Config;
use tracklift_core::{Error, MediaKind, SampleRecord, TrackId};
use tracklift_import::{ImportController, SessionStatus, TrackDescriptor};
use tracklift_media::Mp4Asset;

/// How long a single pop waits before moving on to the next track.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Per-run options from the command line.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Tracks to import; empty imports all of them.
    pub tracks: Vec<TrackId>,
    /// Cancel the session once this many samples have been consumed.
    pub cancel_after: Option<u64>,
}

/// What was drained from one track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub id: TrackId,
    pub kind: MediaKind,
    pub codec: String,
    pub samples: u64,
    pub sync_samples: u64,
    pub bytes: u64,
    pub first_dts: Option<u64>,
    pub last_dts: Option<u64>,
    pub timescale: u32,
}

impl TrackSummary {
    fn new(track: &TrackDescriptor) -> Self {
        Self {
            id: track.id(),
            kind: track.kind(),
            codec: track.meta().codec.clone(),
            samples: 0,
            sync_samples: 0,
            bytes: 0,
            first_dts: None,
            last_dts: None,
            timescale: track.meta().timescale,
        }
    }

    fn add(&mut self, record: &SampleRecord) {
        self.samples += 1;
        self.bytes += record.len() as u64;
        if record.is_sync {
            self.sync_samples += 1;
        }
        self.first_dts.get_or_insert(record.dts);
        self.last_dts = Some(record.dts);
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub status: SessionStatus,
    pub progress: f64,
    pub tracks: Vec<TrackSummary>,
}

impl ImportReport {
    pub fn total_samples(&self) -> u64 {
        self.tracks.iter().map(|t| t.samples).sum()
    }
}

/// Import `path` with `config`, draining samples until the session ends.
pub fn import_file(path: &Path, config: &Config, options: &ImportOptions) -> Result<ImportReport> {
    let asset = Mp4Asset::open(path).with_context(|| format!("Failed to open {:?}", path))?;

    let controller = ImportController::new(config);
    let handle = controller.create_session(asset, &options.tracks)?;
    let tracks = controller.tracks(handle)?;
    let mut summaries: Vec<TrackSummary> = tracks.iter().map(TrackSummary::new).collect();

    tracing::info!(path = ?path, session_id = %handle, tracks = tracks.len(), "Importing file");
    controller.start(handle)?;

    let mut consumed = 0u64;
    'drain: loop {
        let mut drained = true;
        for (track, summary) in tracks.iter().zip(summaries.iter_mut()) {
            if track.queue().is_drained() {
                continue;
            }
            drained = false;

            match controller.pop_timeout(handle, track.id(), POLL_INTERVAL) {
                Ok(Some(record)) => {
                    summary.add(&record);
                    consumed += 1;
                    if options.cancel_after == Some(consumed) {
                        tracing::info!(session_id = %handle, consumed, "Cancelling import");
                        controller.cancel(handle)?;
                    }
                }
                Ok(None) => {}
                Err(Error::SessionAborted { .. }) => break 'drain,
                Err(e) => return Err(e.into()),
            }
        }
        if drained {
            break;
        }
    }

    let status = controller.wait(handle)?;
    let progress = controller.progress(handle)?;
    controller.release(handle)?;

    Ok(ImportReport {
        status,
        progress,
        tracks: summaries,
    })
}
