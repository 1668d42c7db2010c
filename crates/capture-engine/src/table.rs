//! Handle-based session API for callers that can only pass primitive values.
//!
//! Sessions live in an arena keyed by [`SessionHandle`]. Handles are never
//! reused, so a destroyed or unknown handle is reported as
//! [`ScreentapError::InvalidHandle`] instead of reaching another session.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::DisplayId;
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatchStats;
use crate::frame::FrameBuffer;
use crate::session::{CaptureContext, CaptureSession, SessionState};

/// Opaque session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct SessionTable {
    context: CaptureContext,
    sessions: RwLock<HashMap<SessionHandle, Arc<CaptureSession>>>,
    next_handle: AtomicU64,
}

impl SessionTable {
    pub fn new(context: CaptureContext) -> Self {
        Self {
            context,
            sessions: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn context(&self) -> &CaptureContext {
        &self.context
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn create_session(&self) -> SessionHandle {
        let handle = SessionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(CaptureSession::new(self.context.clone()));
        tracing::debug!(%handle, session = session.id(), "Session handle allocated");
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, session);
        handle
    }

    /// Stop and release a session. Unknown handles are ignored.
    pub fn destroy_session(&self, handle: SessionHandle) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        match removed {
            Some(session) => session.teardown(),
            None => tracing::warn!(%handle, "destroy_session called with unknown handle"),
        }
    }

    /// Start capturing. Negative bounds are treated as 0 (native resolution).
    pub fn start_capture(
        &self,
        handle: SessionHandle,
        display_id: u32,
        max_width: i32,
        max_height: i32,
    ) -> ScreentapResult<()> {
        let max_width = u32::try_from(max_width).unwrap_or(0);
        let max_height = u32::try_from(max_height).unwrap_or(0);
        self.session(handle)?
            .start(DisplayId(display_id), max_width, max_height)
    }

    pub fn stop_capture(&self, handle: SessionHandle) -> ScreentapResult<()> {
        self.session(handle)?.stop()
    }

    /// False for unknown or destroyed handles.
    pub fn is_capturing(&self, handle: SessionHandle) -> bool {
        self.session(handle)
            .map(|session| session.is_capturing())
            .unwrap_or(false)
    }

    pub fn set_frame_callback<F>(&self, handle: SessionHandle, callback: F) -> ScreentapResult<()>
    where
        F: Fn(&FrameBuffer<'_>) + Send + Sync + 'static,
    {
        self.session(handle)?.set_frame_callback(callback)
    }

    pub fn clear_frame_callback(&self, handle: SessionHandle) -> ScreentapResult<()> {
        self.session(handle)?.clear_frame_callback()
    }

    pub fn session_state(&self, handle: SessionHandle) -> ScreentapResult<SessionState> {
        Ok(self.session(handle)?.state())
    }

    pub fn session_stats(&self, handle: SessionHandle) -> ScreentapResult<DispatchStats> {
        Ok(self.session(handle)?.stats())
    }

    pub fn has_screen_recording_permission(&self) -> bool {
        self.context.permissions.has_permission()
    }

    pub fn request_screen_recording_permission(&self) {
        self.context.permissions.request_permission();
    }

    pub fn primary_display_id(&self) -> ScreentapResult<u32> {
        self.context.displays.primary_display().map(DisplayId::get)
    }

    pub fn display_count(&self) -> usize {
        self.context.displays.display_count()
    }

    pub fn display_ids(&self) -> Vec<u32> {
        self.context
            .displays
            .list_displays()
            .into_iter()
            .map(DisplayId::get)
            .collect()
    }

    /// Write up to `out.len()` display ids into `out`; returns how many were written.
    pub fn fill_display_ids(&self, out: &mut [u32]) -> usize {
        let ids = self.display_ids();
        let written = ids.len().min(out.len());
        out[..written].copy_from_slice(&ids[..written]);
        written
    }

    /// Destroy every live session.
    pub fn destroy_all(&self) {
        let sessions: Vec<_> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (handle, session) in sessions {
            tracing::debug!(%handle, "Destroying session");
            session.teardown();
        }
    }

    fn session(&self, handle: SessionHandle) -> ScreentapResult<Arc<CaptureSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or(ScreentapError::InvalidHandle)
    }
}

impl Drop for SessionTable {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

impl fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTable")
            .field("context", &self.context)
            .field("sessions", &self.len())
            .finish()
    }
}
