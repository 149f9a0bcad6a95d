//! Per-session state shared between the controller and the worker.

use crate::progress::{ProgressCell, ProgressReporter};
use crate::queue::{SampleQueue, Wakeup};
use crate::status::{SessionStatus, StatusCell};
use crate::worker::Worker;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracklift_core::config::ImportConfig;
use tracklift_core::events::{EventBus, EventPayload};
use tracklift_core::{
    AssetAdapter, Error, MediaKind, Result, SampleRecord, SessionId, TrackId, TrackMeta,
};

/// Host-side token identifying one import session in an
/// [`ImportController`](crate::ImportController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A selected track together with its buffer.
///
/// Fixed at session creation; only the queue contents change afterwards.
#[derive(Debug, Clone)]
pub struct TrackDescriptor {
    meta: TrackMeta,
    weight: f64,
    queue: Arc<SampleQueue>,
}

impl TrackDescriptor {
    pub fn id(&self) -> TrackId {
        self.meta.id
    }

    pub fn kind(&self) -> MediaKind {
        self.meta.kind
    }

    pub fn meta(&self) -> &TrackMeta {
        &self.meta
    }

    /// Progress weight reported by the adapter.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn queue(&self) -> &Arc<SampleQueue> {
        &self.queue
    }
}

/// Adapter and progress state waiting to be moved onto the worker thread.
struct Pending {
    adapter: Box<dyn AssetAdapter>,
    progress: ProgressReporter,
}

pub(crate) struct ImportSession {
    id: SessionId,
    tracks: Vec<TrackDescriptor>,
    status: Arc<StatusCell>,
    progress: Arc<ProgressCell>,
    cancel: CancellationToken,
    wakeup: Arc<Wakeup>,
    pending: Mutex<Option<Pending>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ImportSession {
    /// Resolve the selected tracks and allocate their queues.
    ///
    /// An empty selection takes every track the adapter lists.
    pub(crate) fn new(
        adapter: Box<dyn AssetAdapter>,
        selected: &[TrackId],
        config: &ImportConfig,
    ) -> Result<Self> {
        let available = adapter.track_list()?;

        let metas: Vec<TrackMeta> = if selected.is_empty() {
            available
        } else {
            let mut picked: Vec<TrackMeta> = Vec::with_capacity(selected.len());
            for &id in selected {
                if picked.iter().any(|m| m.id == id) {
                    continue;
                }
                let meta = available
                    .iter()
                    .find(|m| m.id == id)
                    .ok_or(Error::UnknownTrack(id))?;
                picked.push(meta.clone());
            }
            picked
        };

        let wakeup = Arc::new(Wakeup::default());
        let tracks: Vec<TrackDescriptor> = metas
            .into_iter()
            .map(|meta| TrackDescriptor {
                weight: adapter.duration(meta.id),
                queue: Arc::new(SampleQueue::with_wakeup(
                    config.queue_capacity,
                    wakeup.clone(),
                )),
                meta,
            })
            .collect();

        let progress = ProgressReporter::new(tracks.iter().map(|t| (&t.meta, t.weight)));

        Ok(Self {
            id: SessionId::new(),
            status: Arc::new(StatusCell::new()),
            progress: progress.cell(),
            cancel: CancellationToken::new(),
            wakeup,
            pending: Mutex::new(Some(Pending { adapter, progress })),
            worker: Mutex::new(None),
            tracks,
        })
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn handle(&self) -> SessionHandle {
        SessionHandle { id: self.id }
    }

    pub(crate) fn tracks(&self) -> &[TrackDescriptor] {
        &self.tracks
    }

    /// Move the adapter onto a new worker thread.
    pub(crate) fn start(&self, config: &ImportConfig, events: Arc<EventBus>) -> Result<()> {
        let pending = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::invalid_state(format!("session {} already started", self.id)))?;
        let mut worker = self.worker.lock();

        if !self.status.begin() {
            return Err(Error::invalid_state(format!(
                "session {} is {}",
                self.id,
                self.status.get()
            )));
        }

        info!(session_id = %self.id, tracks = self.tracks.len(), "Starting import session");
        events.broadcast(EventPayload::SessionStarted {
            session_id: self.id,
        });

        let job = Worker {
            session_id: self.id,
            adapter: pending.adapter,
            tracks: self
                .tracks
                .iter()
                .map(|t| (t.id(), t.queue.clone()))
                .collect(),
            status: self.status.clone(),
            progress: pending.progress,
            cancel: self.cancel.clone(),
            wakeup: self.wakeup.clone(),
            events,
            progress_step: config.progress_event_step,
            last_progress_event: 0.0,
            samples: 0,
        };

        let id = self.id.to_string();
        let name = format!("{}-{}", config.thread_name_prefix, &id[..8]);
        match job.spawn(name) {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                for track in &self.tracks {
                    track.queue.seal();
                }
                self.status
                    .finish(&SessionStatus::Failed(format!("failed to spawn worker: {}", err)));
                Err(err.into())
            }
        }
    }

    /// Request cancellation. Idempotent; takes effect at the next sample
    /// boundary, or immediately on start if the session is still idle.
    pub(crate) fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(session_id = %self.id, status = %self.status.get(), "Cancellation requested");
        }
        self.cancel.cancel();
        self.wakeup.notify();
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.status.get()
    }

    /// Aggregate progress; exactly `1.0` only once the session completed.
    pub(crate) fn progress(&self) -> f64 {
        match self.status.get() {
            SessionStatus::Completed => 1.0,
            _ => self.progress.get(),
        }
    }

    fn aborted(&self) -> Result<()> {
        let status = self.status.get();
        if status.is_aborted() {
            return Err(Error::SessionAborted {
                session: self.id,
                status: status.name().to_string(),
            });
        }
        Ok(())
    }

    fn queue(&self, track: TrackId) -> Result<&SampleQueue> {
        self.aborted()?;
        self.tracks
            .iter()
            .find(|t| t.id() == track)
            .map(|t| t.queue.as_ref())
            .ok_or(Error::UnknownTrack(track))
    }

    /// Run a pop, then re-check the status so a pop that was waiting when the
    /// session aborted reports the abort instead of a drained queue.
    fn checked_pop(
        &self,
        track: TrackId,
        pop: impl FnOnce(&SampleQueue) -> Option<SampleRecord>,
    ) -> Result<Option<SampleRecord>> {
        let record = pop(self.queue(track)?);
        self.aborted()?;
        Ok(record)
    }

    pub(crate) fn pop(&self, track: TrackId) -> Result<Option<SampleRecord>> {
        self.checked_pop(track, SampleQueue::pop)
    }

    pub(crate) fn try_pop(&self, track: TrackId) -> Result<Option<SampleRecord>> {
        self.checked_pop(track, SampleQueue::try_pop)
    }

    pub(crate) fn pop_timeout(
        &self,
        track: TrackId,
        timeout: Duration,
    ) -> Result<Option<SampleRecord>> {
        self.checked_pop(track, |queue| queue.pop_timeout(timeout))
    }

    /// Block until the worker thread has exited and return the final status.
    pub(crate) fn wait(&self) -> Result<SessionStatus> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            handle
                .join()
                .map_err(|_| Error::Internal(format!("worker for session {} panicked", self.id)))?;
        }

        match self.status.get() {
            SessionStatus::Idle => Err(Error::invalid_state(format!(
                "session {} has not been started",
                self.id
            ))),
            status => Ok(status),
        }
    }
}

impl Drop for ImportSession {
    fn drop(&mut self) {
        // Stops a worker whose session was dropped without being waited on.
        self.cancel.cancel();
        self.wakeup.notify();
    }
}
