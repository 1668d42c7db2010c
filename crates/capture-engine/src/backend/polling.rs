//! Paced producer thread shared by backends that pull frames on a timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use screentap_common::clock::{CaptureClock, FramePacer};
use screentap_common::error::{ScreentapError, ScreentapResult};

use super::CaptureStream;
use crate::dispatcher::{FrameSink, SubmitOutcome};
use crate::frame::RawFrame;

/// Consecutive grab failures after which the producer gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// Produces one frame per call.
pub trait FrameSource: Send + 'static {
    fn grab(&mut self, timestamp_ns: u64) -> ScreentapResult<RawFrame<'static>>;
}

/// A [`CaptureStream`] that calls a [`FrameSource`] at a fixed rate on its own thread.
pub(crate) struct PollingStream {
    label: &'static str,
    fps: u32,
    clock: CaptureClock,
    source: Option<Box<dyn FrameSource>>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PollingStream {
    pub(crate) fn new(
        label: &'static str,
        fps: u32,
        clock: CaptureClock,
        source: Box<dyn FrameSource>,
    ) -> Self {
        Self {
            label,
            fps,
            clock,
            source: Some(source),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CaptureStream for PollingStream {
    fn start(&mut self, sink: FrameSink) -> ScreentapResult<()> {
        let source = self.source.take().ok_or_else(|| {
            ScreentapError::native_capture(format!("{} stream already started", self.label))
        })?;
        let stop_flag = Arc::clone(&self.stop_flag);
        let clock = self.clock.clone();
        let (label, fps) = (self.label, self.fps);

        let worker = thread::Builder::new()
            .name(format!("screentap-{label}"))
            .spawn(move || run_producer(label, fps, clock, source, sink, &stop_flag))
            .map_err(|e| {
                ScreentapError::native_capture(format!("failed to spawn {label} producer: {e}"))
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> ScreentapResult<()> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            worker.join().map_err(|_| {
                ScreentapError::native_capture(format!("{} producer panicked", self.label))
            })?;
        }
        Ok(())
    }
}

impl Drop for PollingStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(stream = self.label, error = %e, "Producer did not shut down cleanly");
        }
    }
}

fn run_producer(
    label: &'static str,
    fps: u32,
    clock: CaptureClock,
    mut source: Box<dyn FrameSource>,
    sink: FrameSink,
    stop_flag: &AtomicBool,
) {
    let mut pacer = FramePacer::new(fps);
    let mut failures = 0u32;
    let mut produced = 0u64;

    while !stop_flag.load(Ordering::SeqCst) && sink.is_open() {
        let deadline = Instant::now() + pacer.wait_time(Instant::now());
        while !stop_flag.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        match source.grab(clock.elapsed_ns()) {
            Ok(frame) => {
                failures = 0;
                produced += 1;
                if sink.submit(frame) == SubmitOutcome::Closed {
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                if failures == 1 {
                    tracing::warn!(stream = label, error = %e, "Frame grab failed");
                }
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!(
                        stream = label,
                        failures,
                        error = %e,
                        "Giving up after repeated grab failures"
                    );
                    break;
                }
            }
        }
    }

    tracing::debug!(stream = label, produced, "Producer thread exiting");
}
