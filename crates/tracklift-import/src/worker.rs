//! Background read loop for one import session.

use crate::progress::ProgressReporter;
use crate::queue::{SampleQueue, Wakeup};
use crate::status::{SessionStatus, StatusCell};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use tracklift_core::events::{EventBus, EventPayload};
use tracklift_core::{AssetAdapter, Pull, SessionId, TrackId};

/// How the read loop ended.
#[derive(Debug)]
enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl Outcome {
    fn status(&self) -> SessionStatus {
        match self {
            Self::Completed => SessionStatus::Completed,
            Self::Cancelled => SessionStatus::Cancelled,
            Self::Failed(detail) => SessionStatus::Failed(detail.clone()),
        }
    }
}

/// Everything the worker thread owns while a session is reading.
pub(crate) struct Worker {
    pub(crate) session_id: SessionId,
    pub(crate) adapter: Box<dyn AssetAdapter>,
    pub(crate) tracks: Vec<(TrackId, Arc<SampleQueue>)>,
    pub(crate) status: Arc<StatusCell>,
    pub(crate) progress: ProgressReporter,
    pub(crate) cancel: CancellationToken,
    pub(crate) wakeup: Arc<Wakeup>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) progress_step: f64,
    pub(crate) last_progress_event: f64,
    pub(crate) samples: u64,
}

impl Worker {
    pub(crate) fn spawn(self, name: String) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    fn run(mut self) {
        debug!(session_id = %self.session_id, tracks = self.tracks.len(), "Import worker running");

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.read_loop())) {
            Ok(outcome) => outcome,
            Err(payload) => Outcome::Failed(format!("adapter panicked: {}", panic_message(&*payload))),
        };

        self.finish(outcome);
    }

    /// Round-robin over unfinished tracks with free queue space until every
    /// track ends, a read fails, or cancellation is observed.
    fn read_loop(&mut self) -> Outcome {
        let count = self.tracks.len();
        let mut finished = vec![false; count];
        let mut next = 0;

        loop {
            // Taken before the checks below so a pop or cancel that races
            // with them still wakes the wait.
            let seen = self.wakeup.current();

            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            if finished.iter().all(|&done| done) {
                return Outcome::Completed;
            }

            let ready = (0..count)
                .map(|offset| (next + offset) % count)
                .find(|&i| !finished[i] && !self.tracks[i].1.is_full());

            let Some(i) = ready else {
                trace!(session_id = %self.session_id, "All queues full, waiting for consumer");
                self.wakeup.wait_past(seen);
                continue;
            };
            next = (i + 1) % count;

            let (track, queue) = &self.tracks[i];
            let track = *track;

            match self.adapter.next_sample(track) {
                Ok(Pull::Sample(record)) => {
                    trace!(%track, dts = record.dts, size = record.len(), "Sample read");
                    let progress = self.progress.record(&record);
                    if let Err(err) = queue.try_push(record) {
                        return Outcome::Failed(format!("track {}: {}", track, err));
                    }
                    self.samples += 1;
                    self.report_progress(progress);
                }
                Ok(Pull::EndOfTrack) => {
                    finished[i] = true;
                    debug!(session_id = %self.session_id, %track, "Track reached end");
                    let progress = self.progress.end_of_track(track);
                    self.report_progress(progress);
                }
                Err(err) => {
                    warn!(session_id = %self.session_id, %track, error = %err, "Sample read failed");
                    return Outcome::Failed(err.to_string());
                }
            }
        }
    }

    fn report_progress(&mut self, progress: f64) {
        if progress - self.last_progress_event >= self.progress_step {
            self.last_progress_event = progress;
            self.events.broadcast(EventPayload::SessionProgress {
                session_id: self.session_id,
                progress,
            });
        }
    }

    /// Publish the terminal status, then seal queues and release the adapter.
    ///
    /// The status goes first so a consumer woken by the seal already sees it.
    fn finish(mut self, outcome: Outcome) {
        let published = self.status.finish(&outcome.status());

        for (_, queue) in &self.tracks {
            queue.seal();
        }

        if panic::catch_unwind(AssertUnwindSafe(|| self.adapter.release())).is_err() {
            warn!(session_id = %self.session_id, "Adapter panicked while releasing");
        }

        if !published {
            error!(session_id = %self.session_id, "Worker finished outside the reading state");
            return;
        }

        let session_id = self.session_id;
        let payload = match outcome {
            Outcome::Completed => {
                self.progress.finish();
                info!(%session_id, samples = self.samples, "Import session completed");
                EventPayload::SessionCompleted {
                    session_id,
                    samples: self.samples,
                }
            }
            Outcome::Cancelled => {
                info!(%session_id, samples = self.samples, "Import session cancelled");
                EventPayload::SessionCancelled {
                    session_id,
                    samples: self.samples,
                }
            }
            Outcome::Failed(error) => {
                error!(%session_id, samples = self.samples, error = %error, "Import session failed");
                EventPayload::SessionFailed { session_id, error }
            }
        };
        self.events.broadcast(payload);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
