use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use screentap_capture_engine::{
    CaptureContext, SessionState, SessionTable, SyntheticBackend,
};
use screentap_common::error::{ScreentapError, StatusCode};
use screentap_platform_core::{PermissionState, StaticDisplayRegistry, StaticPermissionGate};

fn table_with(gate: StaticPermissionGate) -> SessionTable {
    SessionTable::new(CaptureContext::new(
        Arc::new(StaticDisplayRegistry::single()),
        Arc::new(gate),
        Arc::new(SyntheticBackend::new(60)),
    ))
}

#[test]
fn capture_through_handles() {
    let table = table_with(StaticPermissionGate::granted());
    let primary = table.primary_display_id().expect("primary display");
    let handle = table.create_session();

    let frames = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&frames);
    table
        .set_frame_callback(handle, move |frame| {
            assert!(frame.width > 0 && frame.height > 0);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("callback registration");

    table
        .start_capture(handle, primary, 640, 360)
        .expect("start");
    assert!(table.is_capturing(handle));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while frames.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(frames.load(Ordering::SeqCst) > 0);

    table.stop_capture(handle).expect("stop");
    assert!(!table.is_capturing(handle));
    assert_eq!(
        table.session_state(handle).expect("state"),
        SessionState::Stopped
    );

    table.destroy_session(handle);
    assert!(table.is_empty());
}

#[test]
fn destroyed_handle_is_invalid_everywhere() {
    let table = table_with(StaticPermissionGate::granted());
    let handle = table.create_session();
    table.start_capture(handle, 1, 0, 0).expect("start");
    table.destroy_session(handle);

    assert!(!table.is_capturing(handle));
    let start = table.start_capture(handle, 1, 0, 0);
    assert_eq!(StatusCode::of(&start), StatusCode::InvalidHandle);
    assert!(matches!(
        table.stop_capture(handle),
        Err(ScreentapError::InvalidHandle)
    ));
    assert!(matches!(
        table.set_frame_callback(handle, |_| {}),
        Err(ScreentapError::InvalidHandle)
    ));

    // Destroying twice is harmless.
    table.destroy_session(handle);
}

#[test]
fn status_codes_match_boundary_contract() {
    let table = table_with(StaticPermissionGate::denied());
    let handle = table.create_session();

    let denied = table.start_capture(handle, 1, 0, 0);
    assert_eq!(StatusCode::of(&denied).as_i32(), 1);
    assert!(!table.has_screen_recording_permission());

    let granted = table_with(StaticPermissionGate::granted());
    let handle = granted.create_session();
    let missing = granted.start_capture(handle, 9_999_999, 0, 0);
    assert_eq!(StatusCode::of(&missing).as_i32(), 2);

    granted.start_capture(handle, 1, 0, 0).expect("start");
    let again = granted.start_capture(handle, 1, 0, 0);
    assert_eq!(StatusCode::of(&again).as_i32(), 3);
    assert_eq!(StatusCode::of(&granted.stop_capture(handle)).as_i32(), 0);
}

#[test]
fn permission_request_is_forwarded() {
    let gate = Arc::new(StaticPermissionGate::prompting(PermissionState::Granted));
    let table = SessionTable::new(CaptureContext::new(
        Arc::new(StaticDisplayRegistry::single()),
        gate.clone(),
        Arc::new(SyntheticBackend::new(60)),
    ));

    assert!(!table.has_screen_recording_permission());
    table.request_screen_recording_permission();
    assert!(table.has_screen_recording_permission());
    table.request_screen_recording_permission();
    assert_eq!(gate.request_count(), 2);
}

#[test]
fn sessions_are_independent() {
    let table = table_with(StaticPermissionGate::granted());
    let a = table.create_session();
    let b = table.create_session();

    table.start_capture(a, 1, 0, 0).expect("start a");
    table.start_capture(b, 1, 320, 0).expect("start b");
    table.stop_capture(a).expect("stop a");

    assert!(!table.is_capturing(a));
    assert!(table.is_capturing(b));
    assert_eq!(table.len(), 2);

    table.destroy_all();
    assert!(!table.is_capturing(b));
    assert!(table.is_empty());
}
