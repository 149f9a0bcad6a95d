//! tracklift-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other tracklift crates,
//! providing type-safe identifiers, a unified error type, the media-domain
//! types exchanged with an [`AssetAdapter`], application configuration, and a
//! broadcast event bus for session lifecycle notifications.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
