//! Unified error type for tracklift.
//!
//! Adapters, the import worker and the session controller all funnel their
//! failures into [`Error`]. [`Error::is_open`] and [`Error::is_read`] separate
//! the two fault classes an [`AssetAdapter`](crate::AssetAdapter) can produce.

use std::fmt;

use crate::ids::{SessionId, TrackId};

/// Unified error type covering all failure modes in tracklift.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The asset could not be parsed or its tracks enumerated.
    #[error("Open error: {0}")]
    Open(String),

    /// Pulling a sample from a track failed.
    #[error("Read error [track {track}]: {message}")]
    Read {
        /// The track whose read cursor failed.
        track: TrackId,
        /// Human-readable error description.
        message: String,
    },

    /// A track id was requested that the asset does not contain.
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// No session is registered under the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The operation is not valid for the session's current status.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The session ended Failed or Cancelled; its buffered samples are unusable.
    #[error("Session {session} aborted ({status}); buffered samples must be discarded")]
    SessionAborted {
        /// The aborted session.
        session: SessionId,
        /// Terminal status name ("failed" or "cancelled").
        status: String,
    },

    /// Configuration failed validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Open`].
    pub fn open(msg: impl fmt::Display) -> Self {
        Error::Open(msg.to_string())
    }

    /// Convenience constructor for [`Error::Read`].
    pub fn read(track: TrackId, message: impl fmt::Display) -> Self {
        Error::Read {
            track,
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Whether this is an asset open/enumeration failure.
    pub fn is_open(&self) -> bool {
        matches!(self, Error::Open(_))
    }

    /// Whether this is a per-sample read failure.
    pub fn is_read(&self) -> bool {
        matches!(self, Error::Read { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
