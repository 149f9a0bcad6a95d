//! [`AssetAdapter`] implementation over a parsed MP4 file.

use crate::mp4::{Mp4File, Mp4Reader, TrackInfo};
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use tracklift_core::{AssetAdapter, Error, Pull, Result, SampleRecord, TrackId, TrackMeta};

/// MP4 asset that pulls sample payloads lazily from its source.
///
/// The `moov` box is parsed once at construction. Each track keeps a cursor
/// into its resolved sample table; [`AssetAdapter::next_sample`] seeks to the
/// sample's offset and reads exactly its bytes.
#[derive(Debug)]
pub struct Mp4Asset<R = BufReader<File>> {
    /// `None` once the asset has been released.
    source: Option<R>,
    path: Option<PathBuf>,
    file_size: u64,
    mp4: Mp4File,
    tracks: Vec<TrackMeta>,
    cursors: HashMap<TrackId, u32>,
}

impl Mp4Asset<BufReader<File>> {
    /// Open and parse the MP4 file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::open(format!("{}: {}", path.display(), e)))?;
        let mut asset = Self::from_reader(BufReader::new(file))?;
        asset.path = Some(path.to_path_buf());
        Ok(asset)
    }
}

impl<R: Read + Seek + Send> Mp4Asset<R> {
    /// Parse an MP4 from any seekable reader.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut mp4_reader = Mp4Reader::new(reader)?;
        let mp4 = mp4_reader.parse()?;
        let file_size = mp4_reader.file_size();

        let tracks: Vec<TrackMeta> = mp4.tracks.iter().map(|t| track_meta(&mp4, t)).collect();
        let cursors = tracks.iter().map(|t| (t.id, 0)).collect();

        debug!(tracks = tracks.len(), file_size, "opened mp4 asset");

        Ok(Self {
            source: Some(mp4_reader.into_inner()),
            path: None,
            file_size,
            mp4,
            tracks,
            cursors,
        })
    }

    /// Path the asset was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The parsed container structure.
    pub fn file(&self) -> &Mp4File {
        &self.mp4
    }

    /// Whether [`AssetAdapter::release`] has been called.
    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    fn track_info(&self, track: TrackId) -> Option<&TrackInfo> {
        self.mp4.track(track.get())
    }
}

impl<R: Read + Seek + Send> AssetAdapter for Mp4Asset<R> {
    fn track_list(&self) -> Result<Vec<TrackMeta>> {
        Ok(self.tracks.clone())
    }

    fn next_sample(&mut self, track: TrackId) -> Result<Pull> {
        let Some(source) = self.source.as_mut() else {
            return Err(Error::read(track, "asset has been released"));
        };
        let info = self
            .mp4
            .track(track.get())
            .ok_or(Error::UnknownTrack(track))?;
        let cursor = self.cursors.entry(track).or_insert(0);

        let Some(entry) = info.sample_table.get(*cursor) else {
            return Ok(Pull::EndOfTrack);
        };

        if entry.end() > self.file_size {
            return Err(Error::read(
                track,
                format!(
                    "sample {} at offset {} (+{} bytes) lies beyond end of file ({} bytes)",
                    entry.index, entry.offset, entry.size, self.file_size
                ),
            ));
        }

        let mut data = vec![0u8; entry.size as usize];
        source
            .seek(SeekFrom::Start(entry.offset))
            .and_then(|_| source.read_exact(&mut data))
            .map_err(|e| Error::read(track, format!("sample {}: {}", entry.index, e)))?;

        *cursor += 1;
        trace!(%track, index = entry.index, size = entry.size, dts = entry.dts, "read sample");

        Ok(Pull::Sample(SampleRecord {
            track,
            data: Bytes::from(data),
            dts: entry.dts,
            pts: entry.pts(),
            duration: entry.duration,
            is_sync: entry.is_keyframe,
        }))
    }

    fn duration(&self, track: TrackId) -> f64 {
        match self.track_info(track) {
            Some(info) if info.duration > 0 && info.timescale > 0 => info.duration_secs(),
            Some(info) => info.sample_table.sample_count as f64,
            None => 0.0,
        }
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            debug!(path = ?self.path, "released mp4 asset");
        }
        self.cursors.clear();
    }
}

fn track_meta(mp4: &Mp4File, info: &TrackInfo) -> TrackMeta {
    let mut meta = TrackMeta::new(
        TrackId(info.track_id),
        mp4.media_kind(info),
        info.timescale,
        info.duration,
        info.sample_table.sample_count as u64,
    );
    meta.codec = info.codec_str();
    meta.language = info.language.clone();
    meta.width = info.width;
    meta.height = info.height;
    meta.sample_rate = info.sample_rate;
    meta.channels = info.channels;
    meta
}
