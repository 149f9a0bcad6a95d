//! Weighted import progress.
//!
//! Each track contributes `weight * fraction` where the weight comes from
//! [`AssetAdapter::duration`](tracklift_core::AssetAdapter::duration) and the
//! fraction is how much of the track has been read. The aggregate is
//! published to a [`ProgressCell`] that readers load without locking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracklift_core::{SampleRecord, TrackId, TrackMeta};

/// Highest value published before the session completes.
const PENDING_CEILING: f64 = 1.0 - f64::EPSILON;

/// Lock-free, monotonically non-decreasing `f64` snapshot.
#[derive(Debug, Default)]
pub struct ProgressCell(AtomicU64);

impl ProgressCell {
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    /// Raise the stored value to `value` if it is larger.
    fn raise(&self, value: f64) {
        let mut current = self.0.load(Ordering::Acquire);
        while value > f64::from_bits(current) {
            match self.0.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

#[derive(Debug)]
struct TrackProgress {
    weight: f64,
    /// Media duration in the track timescale, when known.
    duration: u64,
    sample_count: u64,
    consumed_time: u64,
    consumed_samples: u64,
    finished: bool,
}

impl TrackProgress {
    fn fraction(&self) -> f64 {
        let fraction = if self.finished {
            1.0
        } else if self.duration > 0 {
            self.consumed_time as f64 / self.duration as f64
        } else if self.sample_count > 0 {
            self.consumed_samples as f64 / self.sample_count as f64
        } else {
            0.0
        };
        fraction.clamp(0.0, 1.0)
    }
}

/// Tracks per-track consumption and publishes the weighted aggregate.
#[derive(Debug)]
pub struct ProgressReporter {
    tracks: Vec<TrackProgress>,
    index: HashMap<TrackId, usize>,
    total_weight: f64,
    cell: Arc<ProgressCell>,
}

impl ProgressReporter {
    /// Build a reporter over `(track, weight)` pairs.
    ///
    /// Negative or non-finite weights count as zero. When every weight is
    /// zero the tracks share the progress equally.
    pub fn new<'a>(tracks: impl IntoIterator<Item = (&'a TrackMeta, f64)>) -> Self {
        let mut entries: Vec<TrackProgress> = Vec::new();
        let mut index = HashMap::new();

        for (meta, weight) in tracks {
            index.insert(meta.id, entries.len());
            entries.push(TrackProgress {
                weight: if weight.is_finite() && weight > 0.0 { weight } else { 0.0 },
                duration: meta.duration,
                sample_count: meta.sample_count,
                consumed_time: 0,
                consumed_samples: 0,
                finished: false,
            });
        }

        let mut total_weight: f64 = entries.iter().map(|t| t.weight).sum();
        if total_weight <= 0.0 {
            for track in &mut entries {
                track.weight = 1.0;
            }
            total_weight = entries.len() as f64;
        }

        Self {
            tracks: entries,
            index,
            total_weight,
            cell: Arc::new(ProgressCell::default()),
        }
    }

    /// Shared cell the aggregate is published to.
    pub fn cell(&self) -> Arc<ProgressCell> {
        self.cell.clone()
    }

    /// Last published aggregate.
    pub fn current(&self) -> f64 {
        self.cell.get()
    }

    /// Account for a record that was read; returns the published aggregate.
    pub fn record(&mut self, record: &SampleRecord) -> f64 {
        if let Some(track) = self.track_mut(record.track) {
            track.consumed_time += record.duration as u64;
            track.consumed_samples += 1;
        }
        self.publish()
    }

    /// Mark a track as fully consumed; returns the published aggregate.
    pub fn end_of_track(&mut self, track: TrackId) -> f64 {
        if let Some(track) = self.track_mut(track) {
            track.finished = true;
        }
        self.publish()
    }

    /// Publish exactly `1.0`. Only called once the session has completed.
    pub fn finish(&self) {
        self.cell.raise(1.0);
    }

    fn track_mut(&mut self, track: TrackId) -> Option<&mut TrackProgress> {
        let idx = *self.index.get(&track)?;
        self.tracks.get_mut(idx)
    }

    fn aggregate(&self) -> f64 {
        if self.tracks.is_empty() {
            return 0.0;
        }
        let weighted: f64 = self.tracks.iter().map(|t| t.weight * t.fraction()).sum();
        weighted / self.total_weight
    }

    fn publish(&self) -> f64 {
        self.cell.raise(self.aggregate().min(PENDING_CEILING));
        self.cell.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tracklift_core::MediaKind;

    fn meta(id: u32, samples: u64, delta: u64) -> TrackMeta {
        TrackMeta::new(TrackId(id), MediaKind::Video, 1000, samples * delta, samples)
    }

    fn sample(track: u32, duration: u32) -> SampleRecord {
        SampleRecord {
            track: TrackId(track),
            data: Bytes::new(),
            dts: 0,
            pts: 0,
            duration,
            is_sync: true,
        }
    }

    #[test]
    fn weighted_average() {
        let video = meta(1, 100, 10);
        let audio = meta(2, 50, 10);
        let mut progress = ProgressReporter::new([(&video, 3.0), (&audio, 1.0)]);

        for _ in 0..50 {
            progress.record(&sample(1, 10));
        }
        assert!((progress.current() - 0.375).abs() < 1e-9);

        progress.end_of_track(TrackId(2));
        assert!((progress.current() - 0.625).abs() < 1e-9);
    }

    #[test]
    fn stays_below_one_until_finish() {
        let track = meta(1, 2, 10);
        let mut progress = ProgressReporter::new([(&track, 1.0)]);

        progress.record(&sample(1, 10));
        progress.record(&sample(1, 10));
        progress.end_of_track(TrackId(1));
        assert!(progress.current() < 1.0);

        progress.finish();
        assert_eq!(progress.current(), 1.0);
    }

    #[test]
    fn zero_weights_share_equally() {
        let a = meta(1, 4, 1);
        let b = meta(2, 4, 1);
        let mut progress = ProgressReporter::new([(&a, 0.0), (&b, 0.0)]);

        progress.end_of_track(TrackId(1));
        assert!((progress.current() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_sample_count() {
        let track = TrackMeta::new(TrackId(1), MediaKind::Audio, 0, 0, 4);
        let mut progress = ProgressReporter::new([(&track, 4.0)]);

        progress.record(&sample(1, 0));
        assert!((progress.current() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn never_decreases() {
        let cell = ProgressCell::default();
        cell.raise(0.4);
        cell.raise(0.2);
        assert_eq!(cell.get(), 0.4);
    }

    #[test]
    fn unknown_track_is_ignored() {
        let track = meta(1, 2, 1);
        let mut progress = ProgressReporter::new([(&track, 1.0)]);
        assert_eq!(progress.record(&sample(9, 1)), 0.0);
    }
}
