//! tracklift-media: MP4 sample-table parsing and the MP4 asset adapter.
//!
//! # Modules
//!
//! - `mp4` - MP4 container parsing (moov, trak, sample tables)
//! - `asset` - [`Mp4Asset`], an [`AssetAdapter`](tracklift_core::AssetAdapter)
//!   that pulls sample payloads out of a parsed file
//! - `fixture` - MP4 writer for tests (feature `fixtures`)
//!
//! # Architecture
//!
//! Opening an asset parses the whole `moov` box once and resolves every
//! track's sample table (offset, size, DTS, CTS offset, duration, sync flag)
//! from stts/stss/stsc/stsz/stco/ctts. Sample payloads are only read when the
//! import worker pulls them, so memory stays bounded by the queue capacity
//! rather than the file size.

pub mod asset;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;
pub mod mp4;

pub use asset::Mp4Asset;
pub use error::{Error, Result};
pub use mp4::Mp4File;
