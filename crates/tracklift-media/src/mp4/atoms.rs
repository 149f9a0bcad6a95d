//! MP4 atom definitions and parsed track information.

use tracklift_core::MediaKind;

use super::SampleTable;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const TREF: Self = Self(*b"tref");
    pub const CHAP: Self = Self(*b"chap");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const UDTA: Self = Self(*b"udta");

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// File offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// File offset one past the end of this atom.
    pub fn end(&self) -> u64 {
        self.data_offset.saturating_add(self.data_size())
    }

    /// File offset of the atom header.
    pub fn start(&self) -> u64 {
        self.data_offset - self.header_size as u64
    }
}

/// Handler type for a track (`hdlr` box).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    /// `sbtl` / `subt` subtitle tracks.
    Subtitle,
    /// QuickTime `text` tracks (chapter lists and legacy subtitles).
    Text,
    Hint,
    Meta,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"sbtl" | b"subt" => Self::Subtitle,
            b"text" => Self::Text,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    /// Media kind for a track with this handler that is not a chapter track.
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Video => MediaKind::Video,
            Self::Audio => MediaKind::Audio,
            Self::Subtitle | Self::Text => MediaKind::Subtitle,
            Self::Hint | Self::Meta | Self::Unknown(_) => MediaKind::Other,
        }
    }
}

/// Track information extracted from a `trak` atom.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub track_id: u32,
    pub handler_type: HandlerType,
    /// Track duration in media timescale.
    pub duration: u64,
    /// Media timescale (time units per second for this track).
    pub timescale: u32,
    /// ISO 639-2/T language from `mdhd`, if not `und`.
    pub language: Option<String>,
    /// Four-cc of the first sample entry in `stsd`.
    pub codec: Option<[u8; 4]>,
    /// Track ids this track points at through a `tref/chap` reference.
    pub chapter_refs: Vec<u32>,
    pub sample_table: SampleTable,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl TrackInfo {
    /// Create empty track info.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            duration: 0,
            timescale: 1,
            language: None,
            codec: None,
            chapter_refs: Vec::new(),
            sample_table: SampleTable::default(),
            width: None,
            height: None,
            sample_rate: None,
            channels: None,
        }
    }

    /// Get duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            0.0
        } else {
            self.duration as f64 / self.timescale as f64
        }
    }

    /// Sample entry four-cc as text, empty when unknown.
    pub fn codec_str(&self) -> String {
        self.codec
            .map(|c| String::from_utf8_lossy(&c).into_owned())
            .unwrap_or_default()
    }
}

/// Decode the packed ISO 639-2/T language code stored in `mdhd`.
///
/// Returns `None` for `und` and for values that do not decode to lowercase
/// ASCII letters.
pub fn decode_language(packed: u16) -> Option<String> {
    let chars = [
        ((packed >> 10) & 0x1f) as u8 + 0x60,
        ((packed >> 5) & 0x1f) as u8 + 0x60,
        (packed & 0x1f) as u8 + 0x60,
    ];
    if !chars.iter().all(u8::is_ascii_lowercase) {
        return None;
    }
    let lang = String::from_utf8_lossy(&chars).into_owned();
    (lang != "und").then_some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(lang: &[u8; 3]) -> u16 {
        ((lang[0] - 0x60) as u16) << 10 | ((lang[1] - 0x60) as u16) << 5 | (lang[2] - 0x60) as u16
    }

    #[test]
    fn language_decodes() {
        assert_eq!(decode_language(pack(b"eng")).as_deref(), Some("eng"));
        assert_eq!(decode_language(pack(b"jpn")).as_deref(), Some("jpn"));
    }

    #[test]
    fn undetermined_language_is_none() {
        assert_eq!(decode_language(pack(b"und")), None);
        assert_eq!(decode_language(0), None);
    }

    #[test]
    fn handler_media_kinds() {
        assert_eq!(HandlerType::from_bytes(*b"vide").media_kind(), MediaKind::Video);
        assert_eq!(HandlerType::from_bytes(*b"soun").media_kind(), MediaKind::Audio);
        assert_eq!(HandlerType::from_bytes(*b"sbtl").media_kind(), MediaKind::Subtitle);
        assert_eq!(HandlerType::from_bytes(*b"text").media_kind(), MediaKind::Subtitle);
        assert_eq!(HandlerType::from_bytes(*b"tmcd").media_kind(), MediaKind::Other);
    }

    #[test]
    fn atom_bounds() {
        let atom = Atom {
            atom_type: AtomType::MOOV,
            size: 100,
            data_offset: 58,
            header_size: 8,
        };
        assert_eq!(atom.start(), 50);
        assert_eq!(atom.end(), 150);
        assert_eq!(atom.data_size(), 92);
    }
}
