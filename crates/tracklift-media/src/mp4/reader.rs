//! MP4 file reader with atom parsing.

use super::{Atom, AtomType, HandlerType, Mp4File, SampleTableBuilder, TrackInfo};
use crate::{Error, Result};
use bytes::Buf;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, trace};

/// Maximum allowed atom data size (64 MB) to prevent OOM on malformed files.
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// MP4 file reader.
pub struct Mp4Reader<R> {
    reader: R,
    file_size: u64,
}

impl<R: Read + Seek> Mp4Reader<R> {
    /// Create a new MP4 reader, measuring the source length.
    pub fn new(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, file_size })
    }

    /// Total length of the underlying source in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Parse the MP4 file.
    pub fn parse(&mut self) -> Result<Mp4File> {
        let mut mp4 = Mp4File {
            duration: 0,
            timescale: 1000,
            tracks: Vec::new(),
            has_faststart: false,
        };

        let mut moov_offset = None;
        let mut mdat_offset = None;

        for atom in self.read_atoms(0, self.file_size)? {
            trace!(atom = %atom.atom_type, offset = atom.start(), size = atom.size, "top-level atom");
            match atom.atom_type {
                AtomType::MOOV => {
                    moov_offset = Some(atom.start());
                    self.parse_moov(&atom, &mut mp4)?;
                }
                AtomType::MDAT => {
                    mdat_offset.get_or_insert(atom.start());
                }
                _ => {}
            }
        }

        let moov_offset = moov_offset.ok_or(Error::MissingAtom("moov"))?;

        // Faststart means moov comes before mdat
        mp4.has_faststart = mdat_offset.map_or(true, |mdat| moov_offset < mdat);

        debug!(
            tracks = mp4.tracks.len(),
            faststart = mp4.has_faststart,
            "parsed mp4 movie box"
        );

        Ok(mp4)
    }

    /// Read atoms at the given level.
    ///
    /// Every atom must fit inside `[start, end)`, except a trailing `mdat`,
    /// which is clamped to `end` so truncated media data still parses.
    fn read_atoms(&mut self, start: u64, end: u64) -> Result<Vec<Atom>> {
        let mut atoms = Vec::new();
        let mut pos = start;

        while end.saturating_sub(pos) >= 8 {
            self.reader.seek(SeekFrom::Start(pos))?;

            let mut header = [0u8; 8];
            self.reader.read_exact(&mut header)?;
            let mut buf = &header[..];
            let size = buf.get_u32() as u64;
            let mut atom_type = [0u8; 4];
            buf.copy_to_slice(&mut atom_type);
            let atom_type = AtomType(atom_type);

            let (mut actual_size, header_size) = match size {
                // 64-bit extended size
                1 => {
                    let mut ext = [0u8; 8];
                    self.reader.read_exact(&mut ext)?;
                    (u64::from_be_bytes(ext), 16u8)
                }
                // Atom extends to end of the enclosing range
                0 => (end - pos, 8u8),
                _ => (size, 8u8),
            };

            if actual_size < header_size as u64 {
                return Err(Error::invalid_mp4(format!(
                    "atom {} at offset {} has invalid size {}",
                    atom_type, pos, actual_size
                )));
            }

            let available = end - pos;
            if actual_size > available {
                if atom_type != AtomType::MDAT || available < header_size as u64 {
                    return Err(Error::invalid_mp4(format!(
                        "atom {} at offset {} with size {} overruns its container ({} bytes left)",
                        atom_type, pos, actual_size, available
                    )));
                }
                debug!(offset = pos, size = actual_size, available, "truncated mdat");
                actual_size = available;
            }

            atoms.push(Atom {
                atom_type,
                size: actual_size,
                data_offset: pos + header_size as u64,
                header_size,
            });

            pos = pos.checked_add(actual_size).ok_or_else(|| {
                Error::invalid_mp4(format!("atom {} at offset {} overflows", atom_type, pos))
            })?;
        }

        Ok(atoms)
    }

    fn read_children(&mut self, parent: &Atom) -> Result<Vec<Atom>> {
        let end = parent.end().min(self.file_size);
        self.read_atoms(parent.data_offset, end)
    }

    /// Read and validate atom data, rejecting oversized atoms.
    fn read_atom_data(&mut self, atom: &Atom) -> Result<Vec<u8>> {
        let size = atom.data_size();
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::invalid_mp4(format!(
                "atom {} data size {} exceeds maximum {}",
                atom.atom_type, size, MAX_ATOM_DATA_SIZE
            )));
        }
        if atom.end() > self.file_size {
            return Err(Error::invalid_mp4(format!(
                "atom {} extends past end of file",
                atom.atom_type
            )));
        }
        self.reader.seek(SeekFrom::Start(atom.data_offset))?;
        let mut data = vec![0u8; size as usize];
        self.reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Parse moov atom.
    fn parse_moov(&mut self, moov: &Atom, mp4: &mut Mp4File) -> Result<()> {
        for child in self.read_children(moov)? {
            match child.atom_type {
                AtomType::MVHD => self.parse_mvhd(&child, mp4)?,
                AtomType::TRAK => {
                    let track = self.parse_trak(&child)?;
                    trace!(
                        track_id = track.track_id,
                        handler = ?track.handler_type,
                        samples = track.sample_table.sample_count,
                        "parsed track"
                    );
                    mp4.tracks.push(track);
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mvhd (movie header).
    fn parse_mvhd(&mut self, atom: &Atom, mp4: &mut Mp4File) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf)?;
        skip_times(&mut buf, version)?;
        need(&buf, 4)?;
        mp4.timescale = buf.get_u32();
        mp4.duration = read_duration(&mut buf, version)?;

        Ok(())
    }

    /// Parse trak (track) atom.
    fn parse_trak(&mut self, trak: &Atom) -> Result<TrackInfo> {
        let mut track = TrackInfo::new(0);

        for child in self.read_children(trak)? {
            match child.atom_type {
                AtomType::TKHD => self.parse_tkhd(&child, &mut track)?,
                AtomType::TREF => self.parse_tref(&child, &mut track)?,
                AtomType::MDIA => self.parse_mdia(&child, &mut track)?,
                _ => {}
            }
        }

        Ok(track)
    }

    /// Parse tkhd (track header).
    fn parse_tkhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf)?;
        skip_times(&mut buf, version)?;
        need(&buf, 4)?;
        track.track_id = buf.get_u32();

        // reserved(4), duration, reserved(8), layer/alt group/volume/reserved(8),
        // matrix(36), then width and height as 16.16 fixed point.
        let to_dimensions = 4 + if version == 1 { 8 } else { 4 } + 8 + 8 + 36;
        if buf.remaining() >= to_dimensions + 8 {
            buf.advance(to_dimensions);
            let w = buf.get_u32() >> 16;
            let h = buf.get_u32() >> 16;
            if w > 0 && h > 0 {
                track.width = Some(w);
                track.height = Some(h);
            }
        }

        Ok(())
    }

    /// Parse tref (track references), collecting `chap` targets.
    fn parse_tref(&mut self, tref: &Atom, track: &mut TrackInfo) -> Result<()> {
        for child in self.read_children(tref)? {
            if child.atom_type != AtomType::CHAP {
                continue;
            }
            let data = self.read_atom_data(&child)?;
            let mut buf = &data[..];
            while buf.remaining() >= 4 {
                track.chapter_refs.push(buf.get_u32());
            }
        }

        Ok(())
    }

    /// Parse mdia (media) atom.
    fn parse_mdia(&mut self, mdia: &Atom, track: &mut TrackInfo) -> Result<()> {
        let children = self.read_children(mdia)?;

        // hdlr decides how stsd is interpreted, so handle it before minf.
        if let Some(hdlr) = children.iter().find(|c| c.atom_type == AtomType::HDLR) {
            self.parse_hdlr(hdlr, track)?;
        }

        for child in &children {
            match child.atom_type {
                AtomType::MDHD => self.parse_mdhd(child, track)?,
                AtomType::MINF => self.parse_minf(child, track)?,
                _ => {}
            }
        }

        Ok(())
    }

    /// Parse mdhd (media header).
    fn parse_mdhd(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        let version = full_box_version(&mut buf)?;
        skip_times(&mut buf, version)?;
        need(&buf, 4)?;
        track.timescale = buf.get_u32();
        track.duration = read_duration(&mut buf, version)?;

        if buf.remaining() >= 2 {
            track.language = super::atoms::decode_language(buf.get_u16());
        }

        Ok(())
    }

    /// Parse hdlr (handler) atom.
    fn parse_hdlr(&mut self, atom: &Atom, track: &mut TrackInfo) -> Result<()> {
        let data = self.read_atom_data(atom)?;
        let mut buf = &data[..];

        // version/flags(4), pre_defined(4), handler_type(4)
        need(&buf, 12)?;
        buf.advance(8);
        let mut handler = [0u8; 4];
        buf.copy_to_slice(&mut handler);
        track.handler_type = HandlerType::from_bytes(handler);

        Ok(())
    }

    /// Parse minf (media info) atom.
    fn parse_minf(&mut self, minf: &Atom, track: &mut TrackInfo) -> Result<()> {
        for child in self.read_children(minf)? {
            if child.atom_type == AtomType::STBL {
                self.parse_stbl(&child, track)?;
            }
        }

        Ok(())
    }

    /// Parse stbl (sample table) atom.
    fn parse_stbl(&mut self, stbl: &Atom, track: &mut TrackInfo) -> Result<()> {
        let mut builder = SampleTableBuilder::new();

        for child in self.read_children(stbl)? {
            match child.atom_type {
                AtomType::STSD => {
                    let data = self.read_atom_data(&child)?;
                    parse_stsd(&data, track);
                }
                AtomType::STTS => {
                    let data = self.read_atom_data(&child)?;
                    builder.set_stts(read_table(&data, 8, |b| (b.get_u32(), b.get_u32()))?);
                }
                AtomType::STSS => {
                    let data = self.read_atom_data(&child)?;
                    builder.set_sync_samples(read_table(&data, 4, |b| b.get_u32())?);
                }
                AtomType::STSC => {
                    let data = self.read_atom_data(&child)?;
                    builder.set_stsc(read_table(&data, 12, |b| {
                        (b.get_u32(), b.get_u32(), b.get_u32())
                    })?);
                }
                AtomType::STSZ => {
                    let data = self.read_atom_data(&child)?;
                    parse_stsz(&data, self.file_size, &mut builder)?;
                }
                AtomType::STCO => {
                    let data = self.read_atom_data(&child)?;
                    builder.set_chunk_offsets(read_table(&data, 4, |b| b.get_u32() as u64)?);
                }
                AtomType::CO64 => {
                    let data = self.read_atom_data(&child)?;
                    builder.set_chunk_offsets(read_table(&data, 8, |b| b.get_u64())?);
                }
                AtomType::CTTS => {
                    let data = self.read_atom_data(&child)?;
                    // Version 0 stores unsigned offsets; reinterpreting matches
                    // what muxers that ignore the version actually write.
                    builder.set_ctts(read_table(&data, 8, |b| (b.get_u32(), b.get_i32()))?);
                }
                _ => {}
            }
        }

        track.sample_table = builder.build();
        Ok(())
    }
}

/// Fail with [`Error::BufferUnderflow`] unless `n` bytes remain.
fn need(buf: &impl Buf, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(Error::BufferUnderflow {
            need: n,
            have: buf.remaining(),
        });
    }
    Ok(())
}

/// Consume the version/flags word of a full box and return the version.
fn full_box_version(buf: &mut &[u8]) -> Result<u8> {
    need(&*buf, 4)?;
    let version = buf.get_u8();
    buf.advance(3);
    Ok(version)
}

/// Skip creation and modification times.
fn skip_times(buf: &mut &[u8], version: u8) -> Result<()> {
    let n = if version == 1 { 16 } else { 8 };
    need(&*buf, n)?;
    buf.advance(n);
    Ok(())
}

fn read_duration(buf: &mut &[u8], version: u8) -> Result<u64> {
    if version == 1 {
        need(&*buf, 8)?;
        Ok(buf.get_u64())
    } else {
        need(&*buf, 4)?;
        Ok(buf.get_u32() as u64)
    }
}

/// Read a full-box table: version/flags, entry count, then fixed-size entries.
///
/// A count larger than the data holds is truncated to the entries present.
fn read_table<T>(
    data: &[u8],
    entry_size: usize,
    mut entry: impl FnMut(&mut &[u8]) -> T,
) -> Result<Vec<T>> {
    let mut buf = data;
    need(&buf, 8)?;
    buf.advance(4);
    let declared = buf.get_u32() as usize;
    let count = declared.min(buf.remaining() / entry_size);

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(entry(&mut buf));
    }
    Ok(entries)
}

/// Parse stsz (sample size).
///
/// With a uniform size the declared count is the only source of the sample
/// count, so it must describe no more bytes than the file holds.
fn parse_stsz(data: &[u8], file_size: u64, builder: &mut SampleTableBuilder) -> Result<()> {
    let mut buf = data;
    need(&buf, 12)?;
    buf.advance(4);
    let uniform_size = buf.get_u32();
    let declared = buf.get_u32();

    if uniform_size > 0 && declared as u64 * uniform_size as u64 > file_size {
        return Err(Error::invalid_mp4(format!(
            "stsz declares {} samples of {} bytes in a {} byte file",
            declared, uniform_size, file_size
        )));
    }

    let sizes = if uniform_size == 0 {
        let count = (declared as usize).min(buf.remaining() / 4);
        (0..count).map(|_| buf.get_u32()).collect()
    } else {
        Vec::new()
    };

    builder.set_stsz(uniform_size, declared, sizes);
    Ok(())
}

/// Parse stsd (sample description): codec four-cc plus audio parameters.
///
/// Layout after version/flags(4) and entry count(4): the first sample entry
/// box header (size, four-cc), then the common SampleEntry fields.
fn parse_stsd(data: &[u8], track: &mut TrackInfo) {
    if data.len() < 16 {
        return;
    }
    let mut codec = [0u8; 4];
    codec.copy_from_slice(&data[12..16]);
    track.codec = Some(codec);

    // AudioSampleEntry: [32..34] channelCount, [40..44] sampleRate (16.16)
    if track.handler_type.is_audio() && data.len() >= 44 {
        track.channels = Some((&data[32..34]).get_u16());
        track.sample_rate = Some((&data[40..44]).get_u32() >> 16);
    }
}
