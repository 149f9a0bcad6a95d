//! Shared test harness for import integration tests.
//!
//! Provides [`ScriptedAdapter`], an in-memory asset whose tracks produce
//! synthetic samples and which can be told to fail, panic, or pause at a
//! given read, plus [`TestHarness`] bundling a controller with a config.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use tracklift_core::config::Config;
use tracklift_core::{AssetAdapter, Error, MediaKind, Pull, Result, SampleRecord, TrackId, TrackMeta};
use tracklift_import::{ImportController, SessionHandle, SessionStatus};

pub const VIDEO: TrackId = TrackId(1);
pub const AUDIO: TrackId = TrackId(2);

/// One synthetic track: `samples` samples of `delta` ticks at timescale 1000.
#[derive(Debug, Clone)]
pub struct ScriptedTrack {
    pub id: TrackId,
    pub kind: MediaKind,
    pub samples: u64,
    pub delta: u32,
}

impl ScriptedTrack {
    pub fn video(samples: u64) -> Self {
        Self {
            id: VIDEO,
            kind: MediaKind::Video,
            samples,
            delta: 40,
        }
    }

    pub fn audio(samples: u64) -> Self {
        Self {
            id: AUDIO,
            kind: MediaKind::Audio,
            samples,
            delta: 80,
        }
    }
}

/// Blocks the adapter on a chosen call until the test opens it.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    waiting: bool,
    open: bool,
}

impl Gate {
    fn pass(&self) {
        let mut state = self.state.lock();
        state.waiting = true;
        self.cond.notify_all();
        while !state.open {
            self.cond.wait(&mut state);
        }
        state.waiting = false;
    }

    /// Block until the adapter is parked at the gate.
    pub fn wait_until_parked(&self) {
        let mut state = self.state.lock();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !state.waiting {
            assert!(
                !self.cond.wait_until(&mut state, deadline).timed_out(),
                "adapter never reached the gate"
            );
        }
    }

    pub fn open(&self) {
        self.state.lock().open = true;
        self.cond.notify_all();
    }
}

/// Counters shared between a test and the adapter it moved into a session.
#[derive(Debug, Default)]
pub struct Probe {
    /// `next_sample` calls, including failing ones.
    pub calls: AtomicU64,
    pub released: AtomicBool,
    pub order: Mutex<Vec<TrackId>>,
}

impl Probe {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// In-memory [`AssetAdapter`] with failure injection.
pub struct ScriptedAdapter {
    tracks: Vec<ScriptedTrack>,
    cursors: HashMap<TrackId, u64>,
    fail_at: Option<(TrackId, u64)>,
    panic_at: Option<(TrackId, u64)>,
    gate_at_call: Option<(u64, Arc<Gate>)>,
    open_error: Option<String>,
    probe: Arc<Probe>,
}

impl ScriptedAdapter {
    pub fn new(tracks: Vec<ScriptedTrack>) -> Self {
        Self {
            cursors: tracks.iter().map(|t| (t.id, 0)).collect(),
            tracks,
            fail_at: None,
            panic_at: None,
            gate_at_call: None,
            open_error: None,
            probe: Arc::new(Probe::default()),
        }
    }

    /// Standard two-track asset: `video` video samples, `audio` audio samples.
    pub fn av(video: u64, audio: u64) -> Self {
        Self::new(vec![ScriptedTrack::video(video), ScriptedTrack::audio(audio)])
    }

    /// Fail reading sample `index` (0-based) of `track`.
    pub fn fail_at(mut self, track: TrackId, index: u64) -> Self {
        self.fail_at = Some((track, index));
        self
    }

    pub fn panic_at(mut self, track: TrackId, index: u64) -> Self {
        self.panic_at = Some((track, index));
        self
    }

    /// Park the `call`-th `next_sample` call (1-based) on `gate`.
    pub fn gate_at_call(mut self, call: u64, gate: Arc<Gate>) -> Self {
        self.gate_at_call = Some((call, gate));
        self
    }

    pub fn fail_to_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

impl AssetAdapter for ScriptedAdapter {
    fn track_list(&self) -> Result<Vec<TrackMeta>> {
        if let Some(message) = &self.open_error {
            return Err(Error::open(message));
        }
        Ok(self
            .tracks
            .iter()
            .map(|t| {
                TrackMeta::new(t.id, t.kind, 1000, t.samples * t.delta as u64, t.samples)
            })
            .collect())
    }

    fn next_sample(&mut self, track: TrackId) -> Result<Pull> {
        let call = self.probe.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.order.lock().push(track);

        if let Some((at, gate)) = &self.gate_at_call {
            if *at == call {
                gate.pass();
            }
        }

        let script = self
            .tracks
            .iter()
            .find(|t| t.id == track)
            .ok_or(Error::UnknownTrack(track))?;
        let cursor = self.cursors.entry(track).or_insert(0);

        if *cursor >= script.samples {
            return Ok(Pull::EndOfTrack);
        }
        if self.fail_at == Some((track, *cursor)) {
            return Err(Error::read(track, format!("corrupt sample {}", cursor)));
        }
        if self.panic_at == Some((track, *cursor)) {
            panic!("scripted panic at sample {}", cursor);
        }

        let index = *cursor;
        *cursor += 1;
        let dts = index * script.delta as u64;
        Ok(Pull::Sample(SampleRecord {
            track,
            data: Bytes::from(index.to_be_bytes().to_vec()),
            dts,
            pts: dts,
            duration: script.delta,
            is_sync: index % 12 == 0,
        }))
    }

    fn duration(&self, track: TrackId) -> f64 {
        self.tracks
            .iter()
            .find(|t| t.id == track)
            .map_or(0.0, |t| (t.samples * t.delta as u64) as f64 / 1000.0)
    }

    fn release(&mut self) {
        self.cursors.clear();
        self.probe.released.store(true, Ordering::SeqCst);
    }
}

/// Controller plus the config it was built from.
pub struct TestHarness {
    pub controller: ImportController,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_capacity(tracklift_core::config::DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(queue_capacity: usize) -> Self {
        let mut config = Config::default();
        config.import.queue_capacity = queue_capacity;
        config.events.capacity = 4096;
        Self {
            controller: ImportController::new(&config),
            config,
        }
    }

    /// Create and start a session over every track of `adapter`.
    pub fn start(&self, adapter: ScriptedAdapter) -> SessionHandle {
        let handle = self
            .controller
            .create_session(adapter, &[])
            .expect("session should be created");
        self.controller.start(handle).expect("session should start");
        handle
    }

    /// Pop every track round-robin until all queues are drained or the
    /// session aborts.
    pub fn drain(&self, handle: SessionHandle) -> HashMap<TrackId, Vec<SampleRecord>> {
        let tracks = self.controller.tracks(handle).unwrap();
        let mut out: HashMap<TrackId, Vec<SampleRecord>> = HashMap::new();
        let deadline = Instant::now() + Duration::from_secs(10);

        loop {
            assert!(Instant::now() < deadline, "drain did not finish");
            let mut drained = true;
            for track in &tracks {
                if track.queue().is_drained() {
                    continue;
                }
                drained = false;
                match self
                    .controller
                    .pop_timeout(handle, track.id(), Duration::from_millis(2))
                {
                    Ok(Some(record)) => out.entry(track.id()).or_default().push(record),
                    Ok(None) => {}
                    Err(Error::SessionAborted { .. }) => return out,
                    Err(e) => panic!("unexpected pop error: {}", e),
                }
            }
            if drained {
                return out;
            }
        }
    }

    /// Poll until `condition` holds, failing the test after 5 seconds.
    pub fn eventually(&self, what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn status(&self, handle: SessionHandle) -> SessionStatus {
        self.controller.status(handle).unwrap()
    }
}
