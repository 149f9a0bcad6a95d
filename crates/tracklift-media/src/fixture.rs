//! Minimal MP4 writer for tests.
//!
//! Produces a faststart file (`ftyp`, `moov`, `mdat`) where every track's
//! samples sit in a single chunk. Payloads are deterministic so readers can
//! check exactly which bytes came back; see [`sample_payload`].

use bytes::{BufMut, BytesMut};
use std::io;
use std::path::Path;

const MOVIE_TIMESCALE: u32 = 1000;

/// Description of one track to write.
#[derive(Debug, Clone)]
pub struct FixtureTrack {
    pub id: u32,
    pub handler: [u8; 4],
    pub codec: [u8; 4],
    pub timescale: u32,
    /// Duration of every sample in `timescale` units.
    pub delta: u32,
    pub sizes: Vec<u32>,
    /// Sync sample period; `None` marks every sample as sync.
    pub sync_every: Option<u32>,
    pub chapter_ref: Option<u32>,
    pub language: [u8; 3],
}

impl FixtureTrack {
    /// An `avc1` video track at 30000/1001 fps with a keyframe every 10 samples.
    pub fn video(id: u32, samples: u32) -> Self {
        Self {
            id,
            handler: *b"vide",
            codec: *b"avc1",
            timescale: 30_000,
            delta: 1001,
            sizes: (0..samples).map(|i| 200 + (i % 5) * 16).collect(),
            sync_every: Some(10),
            chapter_ref: None,
            language: *b"eng",
        }
    }

    /// A stereo 48 kHz `mp4a` track with 1024-sample frames.
    pub fn audio(id: u32, samples: u32) -> Self {
        Self {
            id,
            handler: *b"soun",
            codec: *b"mp4a",
            timescale: 48_000,
            delta: 1024,
            sizes: (0..samples).map(|i| 64 + (i % 3) * 8).collect(),
            sync_every: None,
            chapter_ref: None,
            language: *b"eng",
        }
    }

    /// A QuickTime `text` track with one 5 second sample per chapter.
    pub fn chapters(id: u32, samples: u32) -> Self {
        Self {
            id,
            handler: *b"text",
            codec: *b"text",
            timescale: 1000,
            delta: 5000,
            sizes: vec![12; samples as usize],
            sync_every: None,
            chapter_ref: None,
            language: *b"und",
        }
    }

    /// Point this track's `tref/chap` at `target`.
    pub fn with_chapters(mut self, target: u32) -> Self {
        self.chapter_ref = Some(target);
        self
    }

    pub fn sample_count(&self) -> u32 {
        self.sizes.len() as u32
    }

    /// Media duration in `timescale` units.
    pub fn duration(&self) -> u64 {
        self.sizes.len() as u64 * self.delta as u64
    }

    fn payload_len(&self) -> u64 {
        self.sizes.iter().map(|&s| s as u64).sum()
    }

    fn is_sync(&self, index: u32) -> bool {
        self.sync_every.map_or(true, |every| index % every == 0)
    }
}

/// Payload written for sample `index` of track `track_id`.
///
/// Starts with the track id and sample index (big endian) and is padded with
/// the low byte of the index.
pub fn sample_payload(track_id: u32, index: u32, size: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size as usize);
    data.extend_from_slice(&track_id.to_be_bytes());
    data.extend_from_slice(&index.to_be_bytes());
    data.resize(size as usize, index as u8);
    data
}

/// Serialize `tracks` into a complete MP4 file.
pub fn write_mp4(tracks: &[FixtureTrack]) -> Vec<u8> {
    let mut ftyp = BytesMut::new();
    write_box(&mut ftyp, b"ftyp", |b| {
        b.put_slice(b"isom");
        b.put_u32(0x200);
        b.put_slice(b"isomiso2avc1mp41");
    });

    // stco entries are fixed width, so the moov length does not depend on
    // the offsets it carries.
    let placeholder = write_moov(tracks, &vec![0; tracks.len()]);
    let mut offset = (ftyp.len() + placeholder.len() + 8) as u64;
    let mut chunk_offsets = Vec::with_capacity(tracks.len());
    for track in tracks {
        chunk_offsets.push(offset);
        offset += track.payload_len();
    }
    let moov = write_moov(tracks, &chunk_offsets);

    let mut out = BytesMut::new();
    out.put_slice(&ftyp);
    out.put_slice(&moov);
    write_box(&mut out, b"mdat", |b| {
        for track in tracks {
            for (i, &size) in track.sizes.iter().enumerate() {
                b.put_slice(&sample_payload(track.id, i as u32, size));
            }
        }
    });
    out.to_vec()
}

/// Write an MP4 file for `tracks` to `path`.
pub fn write_mp4_file(path: impl AsRef<Path>, tracks: &[FixtureTrack]) -> io::Result<()> {
    std::fs::write(path, write_mp4(tracks))
}

pub(crate) fn write_box(out: &mut BytesMut, kind: &[u8; 4], body: impl FnOnce(&mut BytesMut)) {
    let start = out.len();
    out.put_u32(0);
    out.put_slice(kind);
    body(out);
    let size = (out.len() - start) as u32;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

pub(crate) fn write_full_box(
    out: &mut BytesMut,
    kind: &[u8; 4],
    version: u8,
    body: impl FnOnce(&mut BytesMut),
) {
    write_box(out, kind, |b| {
        b.put_u32((version as u32) << 24);
        body(b);
    });
}

fn put_matrix(b: &mut BytesMut) {
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        b.put_u32(value);
    }
}

fn write_moov(tracks: &[FixtureTrack], chunk_offsets: &[u64]) -> BytesMut {
    let movie_duration = tracks
        .iter()
        .map(|t| t.duration() * MOVIE_TIMESCALE as u64 / t.timescale.max(1) as u64)
        .max()
        .unwrap_or(0);

    let mut out = BytesMut::new();
    write_box(&mut out, b"moov", |b| {
        write_full_box(b, b"mvhd", 0, |b| {
            b.put_u32(0); // creation time
            b.put_u32(0); // modification time
            b.put_u32(MOVIE_TIMESCALE);
            b.put_u32(movie_duration as u32);
            b.put_u32(0x0001_0000); // rate
            b.put_u16(0x0100); // volume
            b.put_bytes(0, 10);
            put_matrix(b);
            b.put_bytes(0, 24);
            b.put_u32(tracks.iter().map(|t| t.id).max().unwrap_or(0) + 1);
        });
        for (track, &offset) in tracks.iter().zip(chunk_offsets) {
            write_trak(b, track, offset);
        }
    });
    out
}

fn write_trak(out: &mut BytesMut, track: &FixtureTrack, chunk_offset: u64) {
    let is_video = &track.handler == b"vide";
    let is_audio = &track.handler == b"soun";

    write_box(out, b"trak", |b| {
        write_full_box(b, b"tkhd", 0, |b| {
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(track.id);
            b.put_u32(0);
            b.put_u32(track.duration() as u32);
            b.put_bytes(0, 8);
            b.put_u16(0); // layer
            b.put_u16(0); // alternate group
            b.put_u16(if is_audio { 0x0100 } else { 0 });
            b.put_u16(0);
            put_matrix(b);
            let (w, h) = if is_video { (320u32, 240u32) } else { (0, 0) };
            b.put_u32(w << 16);
            b.put_u32(h << 16);
        });

        if let Some(target) = track.chapter_ref {
            write_box(b, b"tref", |b| {
                write_box(b, b"chap", |b| b.put_u32(target));
            });
        }

        write_box(b, b"mdia", |b| {
            write_full_box(b, b"mdhd", 0, |b| {
                b.put_u32(0);
                b.put_u32(0);
                b.put_u32(track.timescale);
                b.put_u32(track.duration() as u32);
                let lang = track.language.map(|c| (c - 0x60) as u16);
                b.put_u16(lang[0] << 10 | lang[1] << 5 | lang[2]);
                b.put_u16(0);
            });
            write_full_box(b, b"hdlr", 0, |b| {
                b.put_u32(0);
                b.put_slice(&track.handler);
                b.put_bytes(0, 12);
                b.put_u8(0); // empty name
            });
            write_box(b, b"minf", |b| {
                write_box(b, b"stbl", |b| write_stbl(b, track, chunk_offset));
            });
        });
    });
}

fn write_stbl(out: &mut BytesMut, track: &FixtureTrack, chunk_offset: u64) {
    let count = track.sample_count();

    write_full_box(out, b"stsd", 0, |b| {
        b.put_u32(1);
        write_box(b, &track.codec, |b| {
            b.put_bytes(0, 6);
            b.put_u16(1); // data reference index
            match &track.handler {
                b"vide" => {
                    b.put_bytes(0, 16);
                    b.put_u16(320);
                    b.put_u16(240);
                    b.put_u32(0x0048_0000);
                    b.put_u32(0x0048_0000);
                    b.put_u32(0);
                    b.put_u16(1); // frame count
                    b.put_bytes(0, 32);
                    b.put_u16(0x0018);
                    b.put_i16(-1);
                }
                b"soun" => {
                    b.put_bytes(0, 8);
                    b.put_u16(2); // channels
                    b.put_u16(16);
                    b.put_u32(0);
                    b.put_u32(track.timescale << 16);
                }
                _ => {}
            }
        });
    });

    write_full_box(out, b"stts", 0, |b| {
        if count > 0 {
            b.put_u32(1);
            b.put_u32(count);
            b.put_u32(track.delta);
        } else {
            b.put_u32(0);
        }
    });

    if track.sync_every.is_some() {
        let sync: Vec<u32> = (0..count).filter(|&i| track.is_sync(i)).collect();
        write_full_box(out, b"stss", 0, |b| {
            b.put_u32(sync.len() as u32);
            for index in sync {
                b.put_u32(index + 1);
            }
        });
    }

    write_full_box(out, b"stsc", 0, |b| {
        if count > 0 {
            b.put_u32(1);
            b.put_u32(1);
            b.put_u32(count);
            b.put_u32(1);
        } else {
            b.put_u32(0);
        }
    });

    write_full_box(out, b"stsz", 0, |b| {
        b.put_u32(0);
        b.put_u32(count);
        for &size in &track.sizes {
            b.put_u32(size);
        }
    });

    write_full_box(out, b"stco", 0, |b| {
        b.put_u32(1);
        b.put_u32(chunk_offset as u32);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_deterministic() {
        let payload = sample_payload(2, 7, 12);
        assert_eq!(payload.len(), 12);
        assert_eq!(&payload[..4], &2u32.to_be_bytes());
        assert_eq!(&payload[4..8], &7u32.to_be_bytes());
        assert_eq!(&payload[8..], &[7, 7, 7, 7]);
        assert_eq!(sample_payload(1, 1, 3).len(), 3);
    }

    #[test]
    fn file_starts_with_ftyp_and_ends_with_mdat() {
        let track = FixtureTrack::audio(1, 3);
        let bytes = write_mp4(&[track.clone()]);

        assert_eq!(&bytes[4..8], b"ftyp");
        let ftyp_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(&bytes[ftyp_len + 4..ftyp_len + 8], b"moov");

        let tail = track.payload_len() as usize;
        let mdat_start = bytes.len() - tail - 8;
        assert_eq!(&bytes[mdat_start + 4..mdat_start + 8], b"mdat");
    }
}
