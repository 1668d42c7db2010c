//! A backend whose frames are pushed by the caller.
//!
//! Useful for feeding frames from an external source and for driving a
//! session deterministically in tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use screentap_common::error::{ScreentapError, ScreentapResult};

use super::{CaptureBackend, CaptureStream, StreamConfig};
use crate::dispatcher::{FrameSink, SubmitOutcome};
use crate::frame::RawFrame;

#[derive(Default)]
struct ManualState {
    sink: Mutex<Option<FrameSink>>,
    last_config: Mutex<Option<StreamConfig>>,
    reject_next: Mutex<Option<String>>,
    opened: AtomicU32,
    stopped: AtomicU32,
}

/// Clones share the same state, so a test can keep one clone and hand
/// another to the session.
#[derive(Clone, Default)]
pub struct ManualBackend {
    state: Arc<ManualState>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open_stream` fail with a native capture error.
    pub fn reject_next_open(&self, message: impl Into<String>) {
        *lock(&self.state.reject_next) = Some(message.into());
    }

    /// Sink of the running stream, if any.
    pub fn sink(&self) -> Option<FrameSink> {
        lock(&self.state.sink).clone()
    }

    /// Configuration of the most recently opened stream.
    pub fn last_config(&self) -> Option<StreamConfig> {
        lock(&self.state.last_config).clone()
    }

    pub fn open_count(&self) -> u32 {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Submit a frame to the running stream's session.
    pub fn push(&self, frame: RawFrame<'_>) -> SubmitOutcome {
        match self.sink() {
            Some(sink) => sink.submit(frame),
            None => SubmitOutcome::Closed,
        }
    }
}

impl CaptureBackend for ManualBackend {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn open_stream(&self, config: &StreamConfig) -> ScreentapResult<Box<dyn CaptureStream>> {
        if let Some(message) = lock(&self.state.reject_next).take() {
            return Err(ScreentapError::native_capture(message));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        *lock(&self.state.last_config) = Some(config.clone());
        Ok(Box::new(ManualStream {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualStream {
    state: Arc<ManualState>,
}

impl CaptureStream for ManualStream {
    fn start(&mut self, sink: FrameSink) -> ScreentapResult<()> {
        *lock(&self.state.sink) = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> ScreentapResult<()> {
        lock(&self.state.sink).take();
        self.state.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
