//! tracklift-import: background import sessions.
//!
//! An import session pulls samples from an [`AssetAdapter`] on a dedicated
//! thread and buffers them in one bounded [`SampleQueue`] per selected track.
//! The host drives everything through [`ImportController`]:
//!
//! ```text
//! create_session -> start -> pop/try_pop ... -> wait -> release
//!                      \-> cancel (any time)
//! ```
//!
//! # Modules
//!
//! - `queue` - bounded FIFO with backpressure and sealing
//! - `progress` - weighted aggregate progress snapshot
//! - `status` - session status and its lock-free cell
//! - `worker` - the background read loop
//! - `session` - per-session state and track descriptors
//! - `controller` - the host-facing registry of sessions
//!
//! [`AssetAdapter`]: tracklift_core::AssetAdapter

pub mod controller;
pub mod progress;
pub mod queue;
pub mod session;
pub mod status;
mod worker;

pub use controller::ImportController;
pub use progress::{ProgressCell, ProgressReporter};
pub use queue::{PushError, SampleQueue};
pub use session::{SessionHandle, TrackDescriptor};
pub use status::SessionStatus;
