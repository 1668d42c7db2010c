use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use screentap_capture_engine::{
    CaptureContext, CaptureSession, DispatchConfig, ManualBackend, PixelFormat, RawFrame,
    SessionState, SubmitOutcome,
};
use screentap_common::error::ScreentapError;
use screentap_platform_core::{DisplayId, StaticDisplayRegistry, StaticPermissionGate};

const PIXEL: [u8; 4] = [1, 2, 3, 255];

fn frame(timestamp_ns: u64) -> RawFrame<'static> {
    RawFrame::borrowed(&PIXEL, 1, 1, 4, PixelFormat::Bgra, timestamp_ns)
}

fn manual_session(queue_depth: usize) -> (CaptureSession, ManualBackend) {
    let backend = ManualBackend::new();
    let context = CaptureContext::new(
        Arc::new(StaticDisplayRegistry::single()),
        Arc::new(StaticPermissionGate::granted()),
        Arc::new(backend.clone()),
    )
    .with_dispatch(DispatchConfig { queue_depth });
    (CaptureSession::new(context), backend)
}

fn recording_callback(session: &CaptureSession) -> mpsc::Receiver<(u64, u64)> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    session
        .set_frame_callback(move |frame| {
            let _ = tx
                .lock()
                .expect("sender lock")
                .send((frame.timestamp_ns, frame.sequence));
        })
        .expect("callback registration");
    rx
}

#[test]
fn out_of_order_frames_are_dropped() {
    let (session, backend) = manual_session(16);
    let rx = recording_callback(&session);
    session.start(DisplayId(1), 0, 0).expect("start");

    for ts in [100, 200, 150, 300] {
        assert_eq!(backend.push(frame(ts)), SubmitOutcome::Queued);
    }

    let delivered: Vec<u64> = (0..3)
        .map(|_| {
            rx.recv_timeout(Duration::from_secs(2))
                .expect("frame should be delivered")
                .0
        })
        .collect();
    assert_eq!(delivered, vec![100, 200, 300]);

    session.stop().expect("stop");
    let stats = session.stats();
    assert_eq!(stats.frames_received, 4);
    assert_eq!(stats.frames_delivered, 3);
    assert_eq!(stats.frames_dropped_out_of_order, 1);
}

#[test]
fn full_queue_drops_newest_frame() {
    let (session, backend) = manual_session(2);
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (seen_tx, seen_rx) = mpsc::channel::<u64>();
    let gate = Mutex::new((entered_tx, release_rx, seen_tx));
    session
        .set_frame_callback(move |frame| {
            let guard = gate.lock().expect("gate lock");
            let _ = guard.2.send(frame.timestamp_ns);
            if frame.timestamp_ns == 1 {
                let _ = guard.0.send(());
                let _ = guard.1.recv_timeout(Duration::from_secs(5));
            }
        })
        .expect("callback registration");
    session.start(DisplayId(1), 0, 0).expect("start");

    assert_eq!(backend.push(frame(1)), SubmitOutcome::Queued);
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("first frame should reach the callback");

    // Callback is blocked: two frames fill the queue, the third is dropped.
    assert_eq!(backend.push(frame(2)), SubmitOutcome::Queued);
    assert_eq!(backend.push(frame(3)), SubmitOutcome::Queued);
    assert_eq!(backend.push(frame(4)), SubmitOutcome::DroppedBackpressure);

    release_tx.send(()).expect("release callback");
    let seen: Vec<u64> = (0..3)
        .map(|_| seen_rx.recv_timeout(Duration::from_secs(2)).expect("frame"))
        .collect();
    assert_eq!(seen, vec![1, 2, 3]);

    session.stop().expect("stop");
    assert_eq!(session.stats().frames_dropped_backpressure, 1);
}

#[test]
fn frames_carry_display_and_sequence() {
    let (session, backend) = manual_session(8);
    let rx = recording_callback(&session);
    session.start(DisplayId(1), 0, 0).expect("start");

    backend.push(frame(10));
    backend.push(frame(20));
    let first = rx.recv_timeout(Duration::from_secs(2)).expect("frame");
    let second = rx.recv_timeout(Duration::from_secs(2)).expect("frame");
    assert_eq!((first.1, second.1), (0, 1));

    session.stop().expect("stop");
}

#[test]
fn sink_is_closed_after_stop() {
    let (session, backend) = manual_session(4);
    let _rx = recording_callback(&session);
    session.start(DisplayId(1), 0, 0).expect("start");

    let stale = backend.sink().expect("running stream has a sink");
    assert!(stale.is_open());
    session.stop().expect("stop");

    assert!(!stale.is_open());
    assert_eq!(stale.submit(frame(5)), SubmitOutcome::Closed);
    assert_eq!(backend.push(frame(6)), SubmitOutcome::Closed);
}

#[test]
fn frames_without_callback_are_discarded() {
    let (session, backend) = manual_session(4);
    session.start(DisplayId(1), 0, 0).expect("start");
    backend.push(frame(1));

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while session.stats().frames_dropped_no_callback == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    session.stop().expect("stop");
    assert_eq!(session.stats().frames_dropped_no_callback, 1);
    assert_eq!(session.stats().frames_delivered, 0);
}

#[test]
fn replaced_callback_receives_later_frames() {
    let (session, backend) = manual_session(4);
    let first = recording_callback(&session);
    session.start(DisplayId(1), 0, 0).expect("start");

    backend.push(frame(1));
    first.recv_timeout(Duration::from_secs(2)).expect("frame");

    let second = recording_callback(&session);
    backend.push(frame(2));
    assert_eq!(
        second.recv_timeout(Duration::from_secs(2)).expect("frame").0,
        2
    );
    assert!(first.try_recv().is_err());

    session.stop().expect("stop");
}

#[test]
fn malformed_frames_are_rejected() {
    let (session, backend) = manual_session(4);
    let _rx = recording_callback(&session);
    session.start(DisplayId(1), 0, 0).expect("start");

    let short = RawFrame::borrowed(&PIXEL, 2, 2, 8, PixelFormat::Bgra, 1);
    assert_eq!(backend.push(short), SubmitOutcome::DroppedMalformed);
    session.stop().expect("stop");
    assert_eq!(session.stats().frames_dropped_malformed, 1);
}

#[test]
fn native_rejection_reverts_state() {
    let (session, backend) = manual_session(2);

    backend.reject_next_open("display stream refused configuration");
    let err = session.start(DisplayId(1), 0, 0).unwrap_err();
    assert!(matches!(err, ScreentapError::NativeCapture { .. }));
    assert_eq!(session.state(), SessionState::Created);

    session.start(DisplayId(1), 0, 0).expect("retry succeeds");
    session.stop().expect("stop");

    backend.reject_next_open("refused again");
    assert!(session.start(DisplayId(1), 0, 0).is_err());
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(backend.open_count(), 1);
}

#[test]
fn destroy_releases_stream_from_any_state() {
    let (created, backend) = manual_session(2);
    created.destroy();
    assert_eq!(backend.stop_count(), 0);

    let (capturing, backend) = manual_session(2);
    capturing.start(DisplayId(1), 0, 0).expect("start");
    capturing.destroy();
    assert_eq!(backend.stop_count(), 1);
    assert!(backend.sink().is_none());

    let (stopped, backend) = manual_session(2);
    stopped.start(DisplayId(1), 0, 0).expect("start");
    stopped.stop().expect("stop");
    stopped.destroy();
    assert_eq!(backend.stop_count(), 1);
}

#[test]
fn restart_from_callback_discards_frames_queued_before_stop() {
    let (session, backend) = manual_session(8);
    let session = Arc::new(session);
    let weak = Arc::downgrade(&session);
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (restarted_tx, restarted_rx) = mpsc::channel::<()>();
    let (seen_tx, seen_rx) = mpsc::channel::<u64>();
    let gate = Mutex::new((entered_tx, release_rx, restarted_tx, seen_tx));
    session
        .set_frame_callback(move |frame| {
            let guard = gate.lock().expect("gate lock");
            let _ = guard.3.send(frame.timestamp_ns);
            if frame.timestamp_ns != 0 {
                return;
            }
            let _ = guard.0.send(());
            let _ = guard.1.recv_timeout(Duration::from_secs(5));
            if let Some(session) = weak.upgrade() {
                session.stop().expect("stop from callback");
                session.start(DisplayId(1), 0, 0).expect("restart from callback");
            }
            let _ = guard.2.send(());
        })
        .expect("callback registration");

    session.start(DisplayId(1), 0, 0).expect("start");
    assert_eq!(backend.push(frame(0)), SubmitOutcome::Queued);
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback entered");
    assert_eq!(backend.push(frame(1)), SubmitOutcome::Queued);
    assert_eq!(backend.push(frame(2)), SubmitOutcome::Queued);
    release_tx.send(()).expect("release callback");
    restarted_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("callback restarted the session");
    assert_eq!(session.state(), SessionState::Capturing);

    assert_eq!(backend.push(frame(3)), SubmitOutcome::Queued);
    let mut delivered = Vec::new();
    while let Ok(ts) = seen_rx.recv_timeout(Duration::from_millis(300)) {
        delivered.push(ts);
    }
    assert_eq!(delivered, vec![0, 3]);
    assert_eq!(backend.open_count(), 2);

    session.stop().expect("stop");
    let stats = session.stats();
    assert_eq!(stats.frames_delivered, 2);
    assert_eq!(stats.frames_dropped_inactive, 2);
}

#[test]
fn timestamps_stay_ordered_across_restart() {
    let (session, backend) = manual_session(8);
    let rx = recording_callback(&session);

    session.start(DisplayId(1), 0, 0).expect("start");
    assert_eq!(backend.push(frame(100)), SubmitOutcome::Queued);
    let (first, _) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("first frame");
    assert_eq!(first, 100);
    session.stop().expect("stop");

    session.start(DisplayId(1), 0, 0).expect("restart");
    assert_eq!(backend.push(frame(50)), SubmitOutcome::Queued);
    assert_eq!(backend.push(frame(150)), SubmitOutcome::Queued);
    let (next, _) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("frame after restart");
    assert_eq!(next, 150);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    session.stop().expect("stop");
    let stats = session.stats();
    assert_eq!(stats.frames_delivered, 2);
    assert_eq!(stats.frames_dropped_out_of_order, 1);
}
