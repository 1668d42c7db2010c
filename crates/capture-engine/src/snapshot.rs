//! Single-frame capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use screentap_common::config::AppConfig;
use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::{ensure_permission, DisplayId};

use crate::frame::{CapturedFrame, FrameBuffer};
use crate::session::{CaptureContext, CaptureSession};

pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PERMISSION_WAIT: Duration = Duration::from_millis(500);

/// Captures one frame with a short-lived session.
#[derive(Debug, Clone)]
pub struct SnapshotService {
    context: CaptureContext,
    frame_timeout: Duration,
    permission_wait: Duration,
}

impl SnapshotService {
    pub fn new(context: CaptureContext) -> Self {
        Self {
            context,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            permission_wait: DEFAULT_PERMISSION_WAIT,
        }
    }

    pub fn from_config(context: CaptureContext, config: &AppConfig) -> Self {
        Self::new(context)
            .with_frame_timeout(Duration::from_millis(config.capture.frame_timeout_ms))
            .with_permission_wait(Duration::from_millis(config.permission.request_wait_ms))
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn with_permission_wait(mut self, wait: Duration) -> Self {
        self.permission_wait = wait;
        self
    }

    /// Grab one frame from `display` (the primary display when `None`).
    ///
    /// Requests consent first if it has not been decided yet.
    pub fn capture_frame(
        &self,
        display: Option<DisplayId>,
        max_width: u32,
        max_height: u32,
    ) -> ScreentapResult<CapturedFrame> {
        ensure_permission(self.context.permissions.as_ref(), self.permission_wait)?;
        let display_id = match display {
            Some(id) => id,
            None => self.context.displays.primary_display()?,
        };

        let session = CaptureSession::new(self.context.clone());
        let (slot, receiver) = FirstFrameSlot::new();
        session.set_frame_callback(move |frame| {
            slot.offer(frame);
        })?;
        session.start(display_id, max_width, max_height)?;

        let result = receiver.recv_timeout(self.frame_timeout);
        session.destroy();

        result.map_err(|_| {
            ScreentapError::timeout(format!(
                "no frame from display {display_id} within {:?}",
                self.frame_timeout
            ))
        })
    }
}

/// Keeps the first frame offered and ignores the rest without copying them.
struct FirstFrameSlot {
    filled: AtomicBool,
    sender: mpsc::SyncSender<CapturedFrame>,
}

impl FirstFrameSlot {
    fn new() -> (Self, mpsc::Receiver<CapturedFrame>) {
        let (sender, receiver) = mpsc::sync_channel(1);
        let slot = Self {
            filled: AtomicBool::new(false),
            sender,
        };
        (slot, receiver)
    }

    /// Returns whether the frame was taken.
    fn offer(&self, frame: &FrameBuffer<'_>) -> bool {
        if self.filled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.sender.try_send(frame.to_owned_frame()).is_ok()
    }
}
