//! Session lifecycle events.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers can catch up.
//! Sending never blocks, so the import worker can publish from its own thread.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::SessionId;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionCreated {
        session_id: SessionId,
        tracks: usize,
    },
    SessionStarted {
        session_id: SessionId,
    },
    SessionProgress {
        session_id: SessionId,
        progress: f64,
    },
    SessionCompleted {
        session_id: SessionId,
        samples: u64,
    },
    SessionFailed {
        session_id: SessionId,
        error: String,
    },
    SessionCancelled {
        session_id: SessionId,
        samples: u64,
    },
}

impl EventPayload {
    /// The session this payload refers to.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SessionCreated { session_id, .. }
            | Self::SessionStarted { session_id }
            | Self::SessionProgress { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionFailed { session_id, .. }
            | Self::SessionCancelled { session_id, .. } => *session_id,
        }
    }

    /// Whether this payload reports a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::SessionCompleted { .. } | Self::SessionFailed { .. } | Self::SessionCancelled { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // Ignore send errors (no subscribers).
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped, no subscribers");
        }
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }

    /// Return the recent events of one session, oldest first.
    pub fn session_history(&self, session_id: SessionId) -> Vec<Event> {
        let recent = self.recent.read();
        recent
            .iter()
            .rev()
            .filter(|e| e.payload.session_id() == session_id)
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let session_id = SessionId::new();
        bus.broadcast(EventPayload::SessionStarted { session_id });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            EventPayload::SessionStarted { session_id: received } => {
                assert_eq!(*received, session_id)
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        let session_id = SessionId::new();

        for _ in 0..150 {
            bus.broadcast(EventPayload::SessionProgress { session_id, progress: 0.5 });
        }

        let recent = bus.recent_events(200);
        assert_eq!(recent.len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn session_history_is_filtered_and_ordered() {
        let bus = EventBus::new(16);
        let a = SessionId::new();
        let b = SessionId::new();

        bus.broadcast(EventPayload::SessionCreated { session_id: a, tracks: 2 });
        bus.broadcast(EventPayload::SessionCreated { session_id: b, tracks: 1 });
        bus.broadcast(EventPayload::SessionStarted { session_id: a });
        bus.broadcast(EventPayload::SessionCompleted { session_id: a, samples: 3 });

        let history = bus.session_history(a);
        assert_eq!(history.len(), 3);
        assert!(matches!(history[0].payload, EventPayload::SessionCreated { .. }));
        assert!(history[2].payload.is_terminal());
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::SessionFailed {
            session_id: SessionId::new(),
            error: "test".into(),
        });
        assert_eq!(bus.recent_events(10).len(), 1);
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = Event::new(EventPayload::SessionCancelled {
            session_id: SessionId::new(),
            samples: 12,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"session_cancelled\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.payload, event.payload);
    }

    #[test]
    fn default_event_bus() {
        let bus = EventBus::default();
        assert!(bus.recent_events(10).is_empty());
    }
}
