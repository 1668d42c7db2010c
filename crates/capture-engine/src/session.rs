//! Capture session lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};

use screentap_common::config::{AppConfig, BackendKind};
use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::{
    DisplayId, DisplayRegistry, PermissionGate, StaticDisplayRegistry, StaticPermissionGate,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::backend::synthetic::SyntheticBackend;
use crate::backend::{select_backend, CaptureBackend, CaptureStream, StreamConfig};
use crate::dispatcher::{
    is_dispatch_thread_of, spawn_dispatcher, DispatchConfig, DispatchCounters, DispatchInlet,
    DispatchStats, FrameSink, TimestampGate,
};
use crate::frame::FrameBuffer;

/// Application frame callback.
///
/// Invoked on the session's dispatch thread, one frame at a time. The
/// buffer is only valid for the duration of the call.
pub type FrameCallback = Arc<dyn Fn(&FrameBuffer<'_>) + Send + Sync + 'static>;

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, never started.
    Created,
    /// Native stream being configured.
    Starting,
    /// Frames are being delivered.
    Capturing,
    /// Stream shutting down; no further deliveries.
    Stopping,
    /// Stopped; may be started again.
    Stopped,
    /// Resources released. Terminal.
    Destroyed,
}

impl SessionState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Starting => 1,
            Self::Capturing => 2,
            Self::Stopping => 3,
            Self::Stopped => 4,
            Self::Destroyed => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Starting,
            2 => Self::Capturing,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Destroyed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Capturing => "capturing",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Collaborators a session consults. Cheap to clone; sessions built from
/// the same context share its registry, gate, and backend.
#[derive(Clone)]
pub struct CaptureContext {
    pub displays: Arc<dyn DisplayRegistry>,
    pub permissions: Arc<dyn PermissionGate>,
    pub backend: Arc<dyn CaptureBackend>,
    pub dispatch: DispatchConfig,
}

impl CaptureContext {
    pub fn new(
        displays: Arc<dyn DisplayRegistry>,
        permissions: Arc<dyn PermissionGate>,
        backend: Arc<dyn CaptureBackend>,
    ) -> Self {
        Self {
            displays,
            permissions,
            backend,
            dispatch: DispatchConfig::default(),
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// One virtual 1920x1080 display, permission granted, test-pattern frames.
    pub fn synthetic(fps: u32) -> Self {
        Self::new(
            Arc::new(StaticDisplayRegistry::single()),
            Arc::new(StaticPermissionGate::granted()),
            Arc::new(SyntheticBackend::new(fps)),
        )
    }

    /// Build the platform's registry, gate, and configured backend.
    pub fn from_config(config: &AppConfig) -> ScreentapResult<Self> {
        let capture = &config.capture;
        let context = if capture.backend == BackendKind::Synthetic {
            Self::synthetic(capture.fps)
        } else {
            let (displays, permissions) = platform_collaborators();
            Self::new(displays, permissions, select_backend(capture.backend, capture.fps)?)
        };
        Ok(context.with_dispatch(DispatchConfig::from(capture)))
    }
}

#[cfg(target_os = "macos")]
fn platform_collaborators() -> (Arc<dyn DisplayRegistry>, Arc<dyn PermissionGate>) {
    use screentap_platform_macos::{CoreGraphicsDisplayRegistry, CoreGraphicsPermissionGate};
    (
        Arc::new(CoreGraphicsDisplayRegistry::new()),
        Arc::new(CoreGraphicsPermissionGate::new()),
    )
}

#[cfg(not(target_os = "macos"))]
fn platform_collaborators() -> (Arc<dyn DisplayRegistry>, Arc<dyn PermissionGate>) {
    use screentap_platform_linux::{DesktopPermissionGate, XrandrDisplayRegistry};
    (
        Arc::new(XrandrDisplayRegistry::new()),
        Arc::new(DesktopPermissionGate::new()),
    )
}

impl fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureContext")
            .field("backend", &self.backend.name())
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// State shared between the session, its inlet, and its dispatch thread.
pub(crate) struct SessionShared {
    pub(crate) id: u64,
    state: AtomicU8,
    callback: Mutex<Option<FrameCallback>>,
    pub(crate) counters: DispatchCounters,
    display_id: Mutex<Option<DisplayId>>,
    /// Generation of the active capture run; bumped when a run begins and ends.
    run: AtomicU64,
    ordering: Mutex<TimestampGate>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            state: AtomicU8::new(SessionState::Created.to_u8()),
            callback: Mutex::new(None),
            counters: DispatchCounters::default(),
            display_id: Mutex::new(None),
            run: AtomicU64::new(0),
            ordering: Mutex::new(TimestampGate::default()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    pub(crate) fn callback(&self) -> Option<FrameCallback> {
        lock(&self.callback).clone()
    }

    fn on_dispatch_thread(&self) -> bool {
        is_dispatch_thread_of(self.id)
    }

    fn begin_run(&self) -> u64 {
        self.run.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn end_run(&self) {
        self.run.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn is_current_run(&self, run: u64) -> bool {
        self.run.load(Ordering::SeqCst) == run
    }

    /// Timestamps must not go backwards over the whole life of the session,
    /// restarts included.
    pub(crate) fn admit_timestamp(&self, timestamp_ns: u64) -> bool {
        lock(&self.ordering).admit(timestamp_ns)
    }
}

/// Resources of the active capture run. Guarded by the control mutex.
#[derive(Default)]
struct Control {
    stream: Option<Box<dyn CaptureStream>>,
    inlet: Option<Arc<DispatchInlet>>,
    dispatcher: Option<JoinHandle<()>>,
    /// Dispatch threads of runs stopped from their own callback, not yet joined.
    retired: Vec<JoinHandle<()>>,
}

/// One capture of one display.
///
/// All methods take `&self`; the session may be shared across threads
/// (for example behind an `Arc`) and control calls are serialised
/// internally. Dropping a session destroys it.
pub struct CaptureSession {
    shared: Arc<SessionShared>,
    context: CaptureContext,
    control: Mutex<Control>,
}

impl CaptureSession {
    /// Create an idle session. Native resources are acquired by [`Self::start`].
    pub fn new(context: CaptureContext) -> Self {
        let shared = Arc::new(SessionShared::new());
        tracing::debug!(
            session = shared.id,
            backend = context.backend.name(),
            "Capture session created"
        );
        Self {
            shared,
            context,
            control: Mutex::new(Control::default()),
        }
    }

    /// Process-unique id used in logs.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Whether frames are currently being delivered.
    pub fn is_capturing(&self) -> bool {
        self.state() == SessionState::Capturing
    }

    /// Display of the current or most recent capture run.
    pub fn display_id(&self) -> Option<DisplayId> {
        *lock(&self.shared.display_id)
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.counters.snapshot()
    }

    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    /// Register the frame callback, replacing any previous one.
    ///
    /// Frames not yet dispatched go to the new callback. A frame the
    /// dispatch thread has already picked up may still reach the old one.
    pub fn set_frame_callback<F>(&self, callback: F) -> ScreentapResult<()>
    where
        F: Fn(&FrameBuffer<'_>) + Send + Sync + 'static,
    {
        self.replace_callback(Some(Arc::new(callback)))
    }

    /// Register an already shared callback.
    pub fn set_shared_callback(&self, callback: FrameCallback) -> ScreentapResult<()> {
        self.replace_callback(Some(callback))
    }

    /// Remove the callback. Frames dispatched afterwards are discarded.
    pub fn clear_frame_callback(&self) -> ScreentapResult<()> {
        self.replace_callback(None)
    }

    fn replace_callback(&self, callback: Option<FrameCallback>) -> ScreentapResult<()> {
        let mut slot = lock(&self.shared.callback);
        if self.state() == SessionState::Destroyed {
            return Err(ScreentapError::InvalidHandle);
        }
        *slot = callback;
        Ok(())
    }

    /// Start capturing `display_id`, scaled to fit within the bounds.
    ///
    /// A bound of 0 leaves that dimension at native resolution. On failure
    /// the session stays in the state it was in.
    ///
    /// Called from the frame callback while another thread is stopping or
    /// destroying the session, this returns
    /// [`ScreentapError::AlreadyCapturing`] without waiting: the session is
    /// shutting down, not restartable from inside its own callback.
    pub fn start(
        &self,
        display_id: DisplayId,
        max_width: u32,
        max_height: u32,
    ) -> ScreentapResult<()> {
        let Some(mut control) = self.acquire_control() else {
            return Err(ScreentapError::AlreadyCapturing);
        };

        let previous = self.state();
        match previous {
            SessionState::Destroyed => return Err(ScreentapError::InvalidHandle),
            SessionState::Starting | SessionState::Capturing | SessionState::Stopping => {
                return Err(ScreentapError::AlreadyCapturing)
            }
            SessionState::Created | SessionState::Stopped => {}
        }

        if !self.context.permissions.has_permission() {
            tracing::warn!(
                session = self.shared.id,
                state = ?self.context.permissions.state(),
                "Screen recording permission not granted"
            );
            return Err(ScreentapError::PermissionDenied);
        }

        let display = self.context.displays.display_info(display_id).map_err(|e| {
            tracing::warn!(session = self.shared.id, %display_id, error = %e, "Display not resolvable");
            ScreentapError::display_not_found(display_id.get())
        })?;

        let config = StreamConfig::new(display, max_width, max_height);
        self.shared.set_state(SessionState::Starting);

        match self.launch(&mut control, &config) {
            Ok(()) => {
                *lock(&self.shared.display_id) = Some(display_id);
                self.shared.set_state(SessionState::Capturing);
                tracing::info!(
                    session = self.shared.id,
                    %display_id,
                    width = config.output_width,
                    height = config.output_height,
                    backend = self.context.backend.name(),
                    "Capture started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(previous);
                tracing::warn!(session = self.shared.id, %display_id, error = %e, "Capture failed to start");
                Err(e)
            }
        }
    }

    fn launch(&self, control: &mut Control, config: &StreamConfig) -> ScreentapResult<()> {
        let (sender, receiver) = mpsc::channel(self.context.dispatch.queue_depth.max(1));
        let inlet = Arc::new(DispatchInlet::new(
            Arc::clone(&self.shared),
            config.display.id,
            sender,
        ));

        let run = self.shared.begin_run();
        let predecessors = std::mem::take(&mut control.retired);
        let dispatcher = spawn_dispatcher(Arc::clone(&self.shared), receiver, run, predecessors)
            .map_err(|e| {
                self.shared.end_run();
                ScreentapError::native_capture(format!("failed to spawn dispatch thread: {e}"))
            })?;

        let stream = self
            .context
            .backend
            .open_stream(config)
            .and_then(|mut stream| {
                stream.start(FrameSink::new(&inlet))?;
                Ok(stream)
            });

        match stream {
            Ok(stream) => {
                control.stream = Some(stream);
                control.inlet = Some(inlet);
                control.dispatcher = Some(dispatcher);
                Ok(())
            }
            Err(e) => {
                self.shared.end_run();
                inlet.close();
                drop(inlet);
                if self.shared.on_dispatch_thread() {
                    // The new thread joins this one first; joining it here would never return.
                    control.retired.push(dispatcher);
                } else if dispatcher.join().is_err() {
                    tracing::warn!(session = self.shared.id, "Dispatch thread panicked");
                }
                Err(into_native_error(e))
            }
        }
    }

    /// Stop capturing. Blocks until no callback is running and none can follow.
    ///
    /// No-op when the session is not capturing.
    pub fn stop(&self) -> ScreentapResult<()> {
        let Some(mut control) = self.acquire_control() else {
            return match self.state() {
                SessionState::Destroyed => Err(ScreentapError::InvalidHandle),
                _ => Ok(()),
            };
        };

        match self.state() {
            SessionState::Destroyed => Err(ScreentapError::InvalidHandle),
            SessionState::Created | SessionState::Stopped => {
                self.reap_retired(&mut control);
                Ok(())
            }
            SessionState::Starting | SessionState::Capturing | SessionState::Stopping => {
                self.halt(&mut control);
                self.shared.set_state(SessionState::Stopped);
                let stats = self.stats();
                tracing::info!(
                    session = self.shared.id,
                    delivered = stats.frames_delivered,
                    dropped = stats.frames_dropped(),
                    "Capture stopped"
                );
                Ok(())
            }
        }
    }

    /// Stop if needed, release the native stream and callback.
    pub fn destroy(self) {
        self.teardown();
    }

    pub(crate) fn teardown(&self) {
        let Some(mut control) = self.acquire_control() else {
            return;
        };

        match self.state() {
            SessionState::Destroyed => return,
            SessionState::Created | SessionState::Stopped => self.reap_retired(&mut control),
            SessionState::Starting | SessionState::Capturing | SessionState::Stopping => {
                self.halt(&mut control);
            }
        }

        self.shared.set_state(SessionState::Destroyed);
        lock(&self.shared.callback).take();
        tracing::debug!(session = self.shared.id, "Capture session destroyed");
    }

    fn halt(&self, control: &mut Control) {
        self.shared.set_state(SessionState::Stopping);
        self.shared.end_run();

        if let Some(mut stream) = control.stream.take() {
            if let Err(e) = stream.stop() {
                tracing::warn!(session = self.shared.id, error = %e, "Native stream failed to stop cleanly");
            }
        }
        if let Some(inlet) = control.inlet.take() {
            inlet.close();
        }
        if let Some(dispatcher) = control.dispatcher.take() {
            control.retired.push(dispatcher);
        }
        if self.shared.on_dispatch_thread() {
            // Called from the frame callback; the thread exits once it returns
            // and the next run joins it before delivering.
            tracing::debug!(session = self.shared.id, "Stop requested from frame callback");
        }
        self.reap_retired(control);
    }

    /// Join dispatch threads of finished runs. Skipped on a dispatch thread.
    fn reap_retired(&self, control: &mut Control) {
        if self.shared.on_dispatch_thread() {
            return;
        }
        for dispatcher in control.retired.drain(..) {
            if dispatcher.join().is_err() {
                tracing::warn!(session = self.shared.id, "Dispatch thread panicked");
            }
        }
    }

    /// Take the control lock.
    ///
    /// On the dispatch thread the lock may be held by a `stop` that is
    /// joining this very thread, so it is only polled; `None` means another
    /// thread is already shutting the run down.
    fn acquire_control(&self) -> Option<MutexGuard<'_, Control>> {
        if !self.shared.on_dispatch_thread() {
            return Some(lock(&self.control));
        }
        loop {
            match self.control.try_lock() {
                Ok(guard) => return Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if self.state() != SessionState::Capturing {
                        return None;
                    }
                    thread::yield_now();
                }
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("display_id", &self.display_id())
            .field("backend", &self.context.backend.name())
            .finish()
    }
}

fn into_native_error(err: ScreentapError) -> ScreentapError {
    match err {
        e @ (ScreentapError::NativeCapture { .. } | ScreentapError::PermissionDenied) => e,
        other => ScreentapError::native_capture(other.to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
