//! Frame hand-off between native producers and the session callback.
//!
//! Producers push into a bounded channel through a [`FrameSink`]; a single
//! dispatch thread per active session drains it and invokes the callback.
//! A full channel drops the incoming frame rather than blocking the producer.

use std::cell::Cell;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use screentap_common::config::CaptureDefaults;
use screentap_platform_core::DisplayId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::frame::{CapturedFrame, RawFrame};
use crate::session::{SessionShared, SessionState};

/// Default number of frames buffered per session.
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Frames buffered between producer and callback. Values below 1 are treated as 1.
    pub queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl From<&CaptureDefaults> for DispatchConfig {
    fn from(defaults: &CaptureDefaults) -> Self {
        Self {
            queue_depth: defaults.queue_depth,
        }
    }
}

/// Delivery counters for one session, cumulative across capture runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Frames handed to the session's sink.
    pub frames_received: u64,
    /// Frames passed to a callback.
    pub frames_delivered: u64,
    /// Frames dropped because the queue was full.
    pub frames_dropped_backpressure: u64,
    /// Frames dropped because the session was not capturing.
    pub frames_dropped_inactive: u64,
    /// Frames dropped for carrying an earlier timestamp than one already delivered.
    pub frames_dropped_out_of_order: u64,
    /// Frames whose data did not cover the described geometry.
    pub frames_dropped_malformed: u64,
    /// Frames dispatched while no callback was registered.
    pub frames_dropped_no_callback: u64,
}

impl DispatchStats {
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped_backpressure
            + self.frames_dropped_inactive
            + self.frames_dropped_out_of_order
            + self.frames_dropped_malformed
            + self.frames_dropped_no_callback
    }
}

#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    received: AtomicU64,
    delivered: AtomicU64,
    dropped_backpressure: AtomicU64,
    dropped_inactive: AtomicU64,
    dropped_out_of_order: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_no_callback: AtomicU64,
}

impl DispatchCounters {
    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            frames_received: self.received.load(Ordering::Relaxed),
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            frames_dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            frames_dropped_inactive: self.dropped_inactive.load(Ordering::Relaxed),
            frames_dropped_out_of_order: self.dropped_out_of_order.load(Ordering::Relaxed),
            frames_dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            frames_dropped_no_callback: self.dropped_no_callback.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// What happened to a frame handed to [`FrameSink::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    DroppedBackpressure,
    DroppedInactive,
    DroppedMalformed,
    /// The capture run this sink belonged to has ended.
    Closed,
}

/// Producer side of one capture run.
///
/// Owned by the session for the lifetime of the run; producers only hold a
/// [`FrameSink`]. Taking the sender closes the channel for good.
pub(crate) struct DispatchInlet {
    shared: Arc<SessionShared>,
    display_id: DisplayId,
    sender: Mutex<Option<mpsc::Sender<CapturedFrame>>>,
    next_sequence: AtomicU64,
}

impl DispatchInlet {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        display_id: DisplayId,
        sender: mpsc::Sender<CapturedFrame>,
    ) -> Self {
        Self {
            shared,
            display_id,
            sender: Mutex::new(Some(sender)),
            next_sequence: AtomicU64::new(0),
        }
    }

    fn submit(&self, raw: RawFrame<'_>) -> SubmitOutcome {
        let counters = &self.shared.counters;
        bump(&counters.received);

        if !matches!(
            self.shared.state(),
            SessionState::Starting | SessionState::Capturing
        ) {
            bump(&counters.dropped_inactive);
            return SubmitOutcome::DroppedInactive;
        }
        if !raw.is_well_formed() {
            bump(&counters.dropped_malformed);
            tracing::warn!(
                session = self.shared.id,
                width = raw.width,
                height = raw.height,
                stride = raw.stride,
                bytes = raw.data.len(),
                "Dropping frame whose data does not match its geometry"
            );
            return SubmitOutcome::DroppedMalformed;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let frame = CapturedFrame::from_raw(raw, self.display_id, sequence);

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            bump(&counters.dropped_inactive);
            return SubmitOutcome::Closed;
        };
        match sender.try_send(frame) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Full(frame)) => {
                bump(&counters.dropped_backpressure);
                tracing::trace!(
                    session = self.shared.id,
                    sequence = frame.sequence,
                    "Frame queue full; dropping newest frame"
                );
                SubmitOutcome::DroppedBackpressure
            }
            Err(TrySendError::Closed(_)) => {
                bump(&counters.dropped_inactive);
                SubmitOutcome::Closed
            }
        }
    }

    fn is_open(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Drop the only sender. The dispatch thread exits once the queue is drained.
    pub(crate) fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Non-owning handle a native producer uses to hand frames to a session.
///
/// Outliving the capture run is harmless: submits after `stop` return
/// [`SubmitOutcome::Closed`] and the frame is discarded.
#[derive(Clone)]
pub struct FrameSink {
    inlet: Weak<DispatchInlet>,
}

impl FrameSink {
    pub(crate) fn new(inlet: &Arc<DispatchInlet>) -> Self {
        Self {
            inlet: Arc::downgrade(inlet),
        }
    }

    /// A sink attached to nothing; every submit returns [`SubmitOutcome::Closed`].
    pub fn detached() -> Self {
        Self { inlet: Weak::new() }
    }

    /// Hand one frame to the session. Never blocks on the consumer.
    pub fn submit(&self, frame: RawFrame<'_>) -> SubmitOutcome {
        match self.inlet.upgrade() {
            Some(inlet) => inlet.submit(frame),
            None => SubmitOutcome::Closed,
        }
    }

    /// Whether submits can still reach the session.
    pub fn is_open(&self) -> bool {
        self.inlet.upgrade().is_some_and(|inlet| inlet.is_open())
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Admits timestamps in non-decreasing order. Lives as long as the session.
#[derive(Debug, Default)]
pub(crate) struct TimestampGate {
    last: Option<u64>,
}

impl TimestampGate {
    pub(crate) fn admit(&mut self, timestamp_ns: u64) -> bool {
        match self.last {
            Some(last) if timestamp_ns < last => false,
            _ => {
                self.last = Some(timestamp_ns);
                true
            }
        }
    }
}

thread_local! {
    static DISPATCHING_SESSION: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Whether the current thread is a dispatch thread of session `session_id`,
/// for this or any earlier capture run.
pub(crate) fn is_dispatch_thread_of(session_id: u64) -> bool {
    DISPATCHING_SESSION.with(|current| current.get() == Some(session_id))
}

/// Spawn the dispatch thread for capture run `run`.
///
/// `predecessors` are dispatch threads of earlier runs that were stopped
/// from their own callback; they are joined before any frame of this run
/// is delivered.
pub(crate) fn spawn_dispatcher(
    shared: Arc<SessionShared>,
    receiver: mpsc::Receiver<CapturedFrame>,
    run: u64,
    predecessors: Vec<JoinHandle<()>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("screentap-dispatch-{}", shared.id))
        .spawn(move || {
            DISPATCHING_SESSION.with(|current| current.set(Some(shared.id)));
            for predecessor in predecessors {
                if predecessor.join().is_err() {
                    tracing::warn!(session = shared.id, "Earlier dispatch thread panicked");
                }
            }
            run_dispatch(&shared, receiver, run);
        })
}

fn run_dispatch(shared: &SessionShared, mut receiver: mpsc::Receiver<CapturedFrame>, run: u64) {
    let counters = &shared.counters;
    tracing::debug!(session = shared.id, run, "Dispatch thread started");

    while let Some(frame) = receiver.blocking_recv() {
        if shared.state() != SessionState::Capturing || !shared.is_current_run(run) {
            bump(&counters.dropped_inactive);
            tracing::trace!(
                session = shared.id,
                run,
                sequence = frame.sequence,
                "Discarding frame outside capture"
            );
            continue;
        }
        if !shared.admit_timestamp(frame.timestamp_ns) {
            bump(&counters.dropped_out_of_order);
            tracing::trace!(
                session = shared.id,
                sequence = frame.sequence,
                timestamp_ns = frame.timestamp_ns,
                "Discarding out-of-order frame"
            );
            continue;
        }
        let Some(callback) = shared.callback() else {
            bump(&counters.dropped_no_callback);
            continue;
        };

        let buffer = frame.as_buffer();
        if panic::catch_unwind(AssertUnwindSafe(|| callback(&buffer))).is_err() {
            tracing::error!(
                session = shared.id,
                sequence = frame.sequence,
                "Frame callback panicked"
            );
        }
        bump(&counters.delivered);
    }

    tracing::debug!(session = shared.id, run, "Dispatch thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn gate_rejects_earlier_timestamps() {
        let mut gate = TimestampGate::default();
        assert!(gate.admit(10));
        assert!(gate.admit(10));
        assert!(!gate.admit(9));
        assert!(gate.admit(11));
        assert!(!gate.admit(10));
    }

    #[test]
    fn detached_sink_is_closed() {
        let sink = FrameSink::detached();
        assert!(!sink.is_open());
        let data = [0u8; 4];
        let frame = RawFrame::borrowed(&data, 1, 1, 4, crate::frame::PixelFormat::Bgra, 0);
        assert_eq!(sink.submit(frame), SubmitOutcome::Closed);
    }

    #[test]
    fn dropped_total_sums_every_reason() {
        let stats = DispatchStats {
            frames_received: 10,
            frames_delivered: 3,
            frames_dropped_backpressure: 1,
            frames_dropped_inactive: 2,
            frames_dropped_out_of_order: 1,
            frames_dropped_malformed: 1,
            frames_dropped_no_callback: 2,
        };
        assert_eq!(stats.frames_dropped(), 7);
    }

    #[test]
    fn queue_depth_follows_capture_defaults() {
        let defaults = CaptureDefaults {
            queue_depth: 5,
            ..CaptureDefaults::default()
        };
        assert_eq!(DispatchConfig::from(&defaults).queue_depth, 5);
        assert_eq!(DispatchConfig::default().queue_depth, DEFAULT_QUEUE_DEPTH);
    }

    proptest! {
        #[test]
        fn admitted_timestamps_never_decrease(stamps in proptest::collection::vec(0u64..1_000, 0..64)) {
            let mut gate = TimestampGate::default();
            let admitted: Vec<u64> = stamps.into_iter().filter(|ts| gate.admit(*ts)).collect();
            prop_assert!(admitted.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}
