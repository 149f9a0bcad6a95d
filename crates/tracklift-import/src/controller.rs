//! Host-facing registry of import sessions.

use crate::session::{ImportSession, SessionHandle, TrackDescriptor};
use crate::status::SessionStatus;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracklift_core::config::{Config, ImportConfig};
use tracklift_core::events::{Event, EventBus, EventPayload};
use tracklift_core::{AssetAdapter, Error, Result, SampleRecord, SessionId, TrackId};

/// Creates, drives and releases import sessions.
///
/// Every operation is keyed by the [`SessionHandle`] returned from
/// [`create_session`](Self::create_session). Handles of released sessions
/// fail with [`Error::SessionNotFound`].
pub struct ImportController {
    config: ImportConfig,
    sessions: DashMap<SessionId, Arc<ImportSession>>,
    events: Arc<EventBus>,
}

impl ImportController {
    /// Create a controller with its own event bus.
    pub fn new(config: &Config) -> Self {
        Self::with_event_bus(
            config.import.clone(),
            Arc::new(EventBus::new(config.events.capacity)),
        )
    }

    /// Create a controller publishing to an existing event bus.
    pub fn with_event_bus(config: ImportConfig, events: Arc<EventBus>) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            events,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Register a session over `adapter` for the given tracks.
    ///
    /// An empty `selected_tracks` selects every track. Open failures of the
    /// adapter and unknown track ids are returned here, before any thread
    /// exists.
    pub fn create_session<A>(&self, adapter: A, selected_tracks: &[TrackId]) -> Result<SessionHandle>
    where
        A: AssetAdapter + 'static,
    {
        let session = ImportSession::new(Box::new(adapter), selected_tracks, &self.config)?;
        let handle = session.handle();

        info!(
            session_id = %handle,
            tracks = session.tracks().len(),
            "Created import session"
        );
        self.events.broadcast(EventPayload::SessionCreated {
            session_id: handle.id(),
            tracks: session.tracks().len(),
        });

        self.sessions.insert(handle.id(), Arc::new(session));
        Ok(handle)
    }

    /// Begin reading on a background thread. Fails if already started.
    pub fn start(&self, handle: SessionHandle) -> Result<()> {
        self.session(handle)?.start(&self.config, self.events.clone())
    }

    /// Request cancellation. Idempotent, and valid in any status.
    pub fn cancel(&self, handle: SessionHandle) -> Result<()> {
        self.session(handle)?.cancel();
        Ok(())
    }

    pub fn status(&self, handle: SessionHandle) -> Result<SessionStatus> {
        Ok(self.session(handle)?.status())
    }

    /// Aggregate progress in `[0, 1]`; `1.0` exactly when completed.
    pub fn progress(&self, handle: SessionHandle) -> Result<f64> {
        Ok(self.session(handle)?.progress())
    }

    /// Descriptors of the session's selected tracks, in selection order.
    pub fn tracks(&self, handle: SessionHandle) -> Result<Vec<TrackDescriptor>> {
        Ok(self.session(handle)?.tracks().to_vec())
    }

    /// Pop the next sample of `track`, blocking while its queue is empty.
    ///
    /// Returns `None` once the track is drained after a completed session.
    /// Fails with [`Error::SessionAborted`] once the session failed or was
    /// cancelled.
    pub fn pop(&self, handle: SessionHandle, track: TrackId) -> Result<Option<SampleRecord>> {
        self.session(handle)?.pop(track)
    }

    /// Non-blocking [`pop`](Self::pop).
    pub fn try_pop(&self, handle: SessionHandle, track: TrackId) -> Result<Option<SampleRecord>> {
        self.session(handle)?.try_pop(track)
    }

    /// [`pop`](Self::pop) giving up after `timeout`.
    pub fn pop_timeout(
        &self,
        handle: SessionHandle,
        track: TrackId,
        timeout: Duration,
    ) -> Result<Option<SampleRecord>> {
        self.session(handle)?.pop_timeout(track, timeout)
    }

    /// Block until the worker exits and return the terminal status.
    ///
    /// A session whose queues fill up only finishes if someone keeps popping
    /// or cancels it.
    pub fn wait(&self, handle: SessionHandle) -> Result<SessionStatus> {
        self.session(handle)?.wait()
    }

    /// Drop a session that is not reading.
    pub fn release(&self, handle: SessionHandle) -> Result<()> {
        let session = self.session(handle)?;
        if session.status() == SessionStatus::Reading {
            return Err(Error::invalid_state(format!(
                "session {} is still reading",
                handle
            )));
        }
        // Reap the finished worker thread.
        if session.status().is_terminal() {
            session.wait()?;
        }
        self.sessions.remove(&handle.id());
        info!(session_id = %handle, "Released import session");
        Ok(())
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Ids of all registered sessions.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    fn session(&self, handle: SessionHandle) -> Result<Arc<ImportSession>> {
        self.sessions
            .get(&handle.id())
            .map(|entry| entry.value().clone())
            .ok_or(Error::SessionNotFound(handle.id()))
    }
}

impl Default for ImportController {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
