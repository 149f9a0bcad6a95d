//! Queue backpressure and scheduling integration tests.

mod common;

use std::thread;
use std::time::Duration;

use common::{ScriptedAdapter, ScriptedTrack, TestHarness, AUDIO, VIDEO};
use tracklift_core::TrackId;
use tracklift_import::SessionStatus;

#[test]
fn full_queues_pause_the_worker() {
    let harness = TestHarness::with_capacity(2);
    let adapter = ScriptedAdapter::av(20, 20);
    let probe = adapter.probe();
    let handle = harness.start(adapter);

    let tracks = harness.controller.tracks(handle).unwrap();
    harness.eventually("both queues to fill", || {
        tracks.iter().all(|t| t.queue().is_full())
    });

    let calls = probe.calls();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(probe.calls(), calls, "worker kept reading into full queues");
    assert_eq!(calls, 4);
    assert_eq!(harness.status(handle), SessionStatus::Reading);

    let samples = harness.drain(handle);
    assert_eq!(harness.controller.wait(handle).unwrap(), SessionStatus::Completed);
    assert_eq!(samples[&VIDEO].len(), 20);
    assert_eq!(samples[&AUDIO].len(), 20);
    for (track, records) in &samples {
        let dts: Vec<u64> = records.iter().map(|r| r.dts).collect();
        let mut sorted = dts.clone();
        sorted.sort_unstable();
        assert_eq!(dts, sorted, "track {} delivered out of order", track);
    }
}

#[test]
fn full_queue_is_skipped_for_other_tracks() {
    let harness = TestHarness::with_capacity(3);
    let handle = harness.start(ScriptedAdapter::av(10, 10));
    let tracks = harness.controller.tracks(handle).unwrap();

    harness.eventually("both queues to fill", || {
        tracks.iter().all(|t| t.queue().is_full())
    });

    // Draining only audio lets audio run ahead while video stays parked.
    let audio: Vec<u64> = (0..10)
        .map(|_| harness.controller.pop(handle, AUDIO).unwrap().unwrap().dts)
        .collect();
    assert_eq!(audio, (0..10).map(|i| i * 80).collect::<Vec<u64>>());

    let video = tracks.iter().find(|t| t.id() == VIDEO).unwrap();
    assert_eq!(video.queue().pushed_total(), 3);
    assert_eq!(harness.status(handle), SessionStatus::Reading);

    let rest = harness.drain(handle);
    assert_eq!(rest[&VIDEO].len(), 10);
    assert_eq!(harness.controller.wait(handle).unwrap(), SessionStatus::Completed);
}

#[test]
fn blocked_worker_still_cancels() {
    let harness = TestHarness::with_capacity(1);
    let adapter = ScriptedAdapter::av(50, 50);
    let probe = adapter.probe();
    let handle = harness.start(adapter);
    let tracks = harness.controller.tracks(handle).unwrap();

    harness.eventually("both queues to fill", || {
        tracks.iter().all(|t| t.queue().is_full())
    });

    harness.controller.cancel(handle).unwrap();
    assert_eq!(harness.controller.wait(handle).unwrap(), SessionStatus::Cancelled);
    assert_eq!(probe.calls(), 2);
    assert!(probe.released());
}

#[test]
fn reads_alternate_between_tracks() {
    let harness = TestHarness::with_capacity(64);
    let adapter = ScriptedAdapter::new(vec![
        ScriptedTrack::video(4),
        ScriptedTrack::audio(2),
        ScriptedTrack {
            id: TrackId(3),
            ..ScriptedTrack::audio(1)
        },
    ]);
    let probe = adapter.probe();
    let handle = harness.start(adapter);
    assert_eq!(harness.controller.wait(handle).unwrap(), SessionStatus::Completed);

    let order: Vec<u32> = probe.order.lock().iter().map(|t| t.get()).collect();
    // Each track is pulled once more than it has samples, to see EndOfTrack.
    assert_eq!(order, vec![1, 2, 3, 1, 2, 3, 1, 2, 1, 1]);
}

#[test]
fn selected_subset_only_reads_those_tracks() {
    let harness = TestHarness::with_capacity(64);
    let adapter = ScriptedAdapter::av(5, 5);
    let probe = adapter.probe();

    let handle = harness.controller.create_session(adapter, &[AUDIO]).unwrap();
    harness.controller.start(handle).unwrap();
    assert_eq!(harness.controller.wait(handle).unwrap(), SessionStatus::Completed);

    assert!(probe.order.lock().iter().all(|&t| t == AUDIO));
    assert_eq!(
        harness.controller.pop(handle, VIDEO).unwrap_err().to_string(),
        "Unknown track: 1"
    );
}
