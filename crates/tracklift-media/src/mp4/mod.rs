//! MP4 container parsing.
//!
//! This module parses the `moov` box of an MP4 file into per-track sample
//! tables, which is everything the asset adapter needs to pull samples in
//! decode order.

mod atoms;
mod reader;
mod sample_table;

pub use atoms::{decode_language, Atom, AtomType, HandlerType, TrackInfo};
pub use reader::Mp4Reader;
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};

use crate::Result;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracklift_core::MediaKind;

/// Parsed MP4 file with extracted sample tables.
#[derive(Debug)]
pub struct Mp4File {
    /// Duration in timescale units.
    pub duration: u64,
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// Every track in `moov`, in file order.
    pub tracks: Vec<TrackInfo>,
    /// Whether the file has faststart (moov before mdat).
    pub has_faststart: bool,
}

impl Mp4File {
    /// Parse an MP4 file from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::parse(&mut reader)
    }

    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        Mp4Reader::new(reader)?.parse()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// Look up a track by its `tkhd` track id.
    pub fn track(&self, track_id: u32) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// First video track, if any.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.handler_type.is_video())
    }

    /// Ids of tracks referenced by some other track's `tref/chap` box.
    pub fn chapter_track_ids(&self) -> HashSet<u32> {
        self.tracks
            .iter()
            .flat_map(|t| t.chapter_refs.iter().copied())
            .collect()
    }

    /// Media kind of a track, taking chapter references into account.
    pub fn media_kind(&self, track: &TrackInfo) -> MediaKind {
        if self.chapter_track_ids().contains(&track.track_id) {
            MediaKind::Chapter
        } else {
            track.handler_type.media_kind()
        }
    }

    /// Calculate the maximum keyframe interval in seconds.
    ///
    /// Returns the largest gap between consecutive keyframes in the first
    /// video track, or `None` if there is no video track or fewer than 2
    /// keyframes.
    pub fn max_keyframe_interval_secs(&self) -> Option<f64> {
        let video = self.video_track()?;
        if video.timescale == 0 {
            return None;
        }

        let keyframe_dts: Vec<u64> = video
            .sample_table
            .iter()
            .filter(|s| s.is_keyframe)
            .map(|s| s.dts)
            .collect();

        let max_interval = keyframe_dts
            .windows(2)
            .map(|w| w[1].saturating_sub(w[0]))
            .max()?;

        Some(max_interval as f64 / video.timescale as f64)
    }
}
