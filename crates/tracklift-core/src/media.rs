//! Media-domain types exchanged between an asset adapter and the import worker.
//!
//! [`AssetAdapter`] is the seam to the container-reading library: it
//! enumerates tracks and hands out one [`SampleRecord`] at a time per track.
//! Everything downstream of the adapter treats sample payloads as opaque bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::ids::TrackId;

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// What kind of timed stream a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Subtitle,
    Chapter,
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Chapter => write!(f, "chapter"),
            Self::Other => write!(f, "other"),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackMeta
// ---------------------------------------------------------------------------

/// Static metadata for one track, as reported by [`AssetAdapter::track_list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub id: TrackId,
    pub kind: MediaKind,
    /// Time units per second for every timestamp of this track.
    pub timescale: u32,
    /// Track duration in `timescale` units.
    pub duration: u64,
    pub sample_count: u64,
    /// Sample entry four-cc (`avc1`, `mp4a`, `tx3g`, ...).
    pub codec: String,
    /// ISO 639-2/T language code, when the container carries one.
    pub language: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl TrackMeta {
    /// Create metadata with only the fields every track has.
    pub fn new(id: TrackId, kind: MediaKind, timescale: u32, duration: u64, sample_count: u64) -> Self {
        Self {
            id,
            kind,
            timescale,
            duration,
            sample_count,
            codec: String::new(),
            language: None,
            width: None,
            height: None,
            sample_rate: None,
            channels: None,
        }
    }

    /// Track duration in seconds (0 when the timescale is unset).
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }
}

// ---------------------------------------------------------------------------
// SampleRecord
// ---------------------------------------------------------------------------

/// One extracted sample. Timestamps are in the owning track's timescale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub track: TrackId,
    /// Encoded payload, never inspected by the import core.
    pub data: Bytes,
    pub dts: u64,
    pub pts: u64,
    pub duration: u32,
    /// Whether this is a sync sample (key frame).
    pub is_sync: bool,
}

impl SampleRecord {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

/// Outcome of a successful [`AssetAdapter::next_sample`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Sample(SampleRecord),
    /// The track's cursor is exhausted. Repeated pulls keep returning this.
    EndOfTrack,
}

// ---------------------------------------------------------------------------
// AssetAdapter
// ---------------------------------------------------------------------------

/// Pull-style access to the tracks and samples of one asset.
///
/// Implementations own one read cursor per track. Samples of a track must be
/// produced in non-decreasing decode-timestamp order.
pub trait AssetAdapter: Send {
    /// Enumerate the asset's tracks in container order.
    ///
    /// Fails with [`Error::Open`](crate::Error::Open) when the asset cannot be
    /// parsed.
    fn track_list(&self) -> Result<Vec<TrackMeta>>;

    /// Pull the next sample of `track`, advancing its cursor.
    ///
    /// Failures are reported as [`Error::Read`](crate::Error::Read).
    fn next_sample(&mut self, track: TrackId) -> Result<Pull>;

    /// Progress weight of `track`. Fixed for the adapter's lifetime.
    fn duration(&self, track: TrackId) -> f64;

    /// Drop every per-track cursor. Called once when a session ends.
    fn release(&mut self) {}
}

impl<A: AssetAdapter + ?Sized> AssetAdapter for Box<A> {
    fn track_list(&self) -> Result<Vec<TrackMeta>> {
        (**self).track_list()
    }

    fn next_sample(&mut self, track: TrackId) -> Result<Pull> {
        (**self).next_sample(track)
    }

    fn duration(&self, track: TrackId) -> f64 {
        (**self).duration(track)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_display_matches_serde() {
        for kind in [
            MediaKind::Video,
            MediaKind::Audio,
            MediaKind::Subtitle,
            MediaKind::Chapter,
            MediaKind::Other,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn track_meta_duration_secs() {
        let meta = TrackMeta::new(TrackId(1), MediaKind::Audio, 48_000, 96_000, 94);
        assert!((meta.duration_secs() - 2.0).abs() < f64::EPSILON);

        let unset = TrackMeta::new(TrackId(1), MediaKind::Audio, 0, 96_000, 94);
        assert_eq!(unset.duration_secs(), 0.0);
    }

    #[test]
    fn sample_record_len() {
        let record = SampleRecord {
            track: TrackId(1),
            data: Bytes::from_static(b"abcd"),
            dts: 0,
            pts: 0,
            duration: 1,
            is_sync: true,
        };
        assert_eq!(record.len(), 4);
        assert!(!record.is_empty());
    }
}
