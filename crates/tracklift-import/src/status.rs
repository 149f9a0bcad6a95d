//! Session status and the cell the worker publishes it through.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Lifecycle status of an import session.
///
/// Transitions are `Idle -> Reading -> {Completed | Cancelled | Failed}` and
/// are never revisited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Reading,
    Completed,
    Cancelled,
    Failed(String),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }

    /// Ended without reading every track to the end.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Reading => "reading",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::Idle => IDLE,
            Self::Reading => READING,
            Self::Completed => COMPLETED,
            Self::Cancelled => CANCELLED,
            Self::Failed(_) => FAILED,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(detail) => write!(f, "failed: {}", detail),
            other => f.write_str(other.name()),
        }
    }
}

const IDLE: u8 = 0;
const READING: u8 = 1;
const COMPLETED: u8 = 2;
const CANCELLED: u8 = 3;
const FAILED: u8 = 4;

/// Atomically published [`SessionStatus`].
///
/// The discriminant lives in an atomic and the failure detail in a
/// write-once cell set before the discriminant, so reads never lock.
#[derive(Debug)]
pub(crate) struct StatusCell {
    state: AtomicU8,
    detail: OnceLock<String>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            detail: OnceLock::new(),
        }
    }

    pub(crate) fn get(&self) -> SessionStatus {
        match self.state.load(Ordering::Acquire) {
            IDLE => SessionStatus::Idle,
            READING => SessionStatus::Reading,
            COMPLETED => SessionStatus::Completed,
            CANCELLED => SessionStatus::Cancelled,
            _ => SessionStatus::Failed(self.detail.get().cloned().unwrap_or_default()),
        }
    }

    /// `Idle -> Reading`. Returns `false` if the session already left `Idle`.
    pub(crate) fn begin(&self) -> bool {
        self.state
            .compare_exchange(IDLE, READING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Reading -> terminal`. Returns `false` if not currently reading.
    pub(crate) fn finish(&self, terminal: &SessionStatus) -> bool {
        debug_assert!(terminal.is_terminal());
        if self.state.load(Ordering::Acquire) != READING {
            return false;
        }
        if let SessionStatus::Failed(detail) = terminal {
            if self.detail.set(detail.clone()).is_err() {
                return false;
            }
        }
        self.state
            .compare_exchange(READING, terminal.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
