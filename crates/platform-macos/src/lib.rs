//! macOS platform integration.
//!
//! CoreGraphics display enumeration, the screen-recording consent API
//! (`CGPreflightScreenCaptureAccess` / `CGRequestScreenCaptureAccess`), and
//! single-image display grabs used by the polling capture backend.
//!
//! On other targets every entry point compiles but reports
//! [`ScreentapError::Unsupported`](screentap_common::ScreentapError) or an
//! empty display list.

use std::sync::atomic::{AtomicBool, Ordering};

use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::{
    DisplayId, DisplayInfo, DisplayRegistry, PermissionGate, PermissionState,
};

#[cfg(target_os = "macos")]
mod ffi;

/// Pixels of one display grab, BGRA with row padding.
#[derive(Debug, Clone)]
pub struct DisplayImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

/// Display registry backed by `CGGetActiveDisplayList`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreGraphicsDisplayRegistry;

impl CoreGraphicsDisplayRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl DisplayRegistry for CoreGraphicsDisplayRegistry {
    #[cfg(target_os = "macos")]
    fn list_display_info(&self) -> ScreentapResult<Vec<DisplayInfo>> {
        let main = ffi::main_display_id();
        let displays = ffi::active_display_ids()?
            .into_iter()
            .map(|id| {
                let (width, height) = ffi::display_pixel_size(id);
                let bounds = ffi::display_bounds(id);
                let scale_factor = if bounds.size.width > 0.0 {
                    width as f64 / bounds.size.width
                } else {
                    1.0
                };
                DisplayInfo {
                    id: DisplayId(id),
                    name: format!("Display {id}"),
                    width,
                    height,
                    x: bounds.origin.x as i32,
                    y: bounds.origin.y as i32,
                    scale_factor,
                    refresh_rate_hz: 0,
                    primary: id == main,
                }
            })
            .collect();
        Ok(displays)
    }

    #[cfg(target_os = "macos")]
    fn primary_display(&self) -> ScreentapResult<DisplayId> {
        match ffi::main_display_id() {
            0 => Err(ScreentapError::NoDisplayFound),
            id => Ok(DisplayId(id)),
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn list_display_info(&self) -> ScreentapResult<Vec<DisplayInfo>> {
        Err(ScreentapError::unsupported(
            "CoreGraphics display enumeration is only available on macOS",
        ))
    }
}

/// Screen-recording consent via the CoreGraphics access API.
///
/// Preflight cannot tell "never asked" from "refused", so a refusal is only
/// reported as [`PermissionState::Denied`] after this process has asked.
#[derive(Debug, Default)]
pub struct CoreGraphicsPermissionGate {
    requested: AtomicBool,
}

impl CoreGraphicsPermissionGate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionGate for CoreGraphicsPermissionGate {
    fn state(&self) -> PermissionState {
        if preflight_access() {
            PermissionState::Granted
        } else if self.requested.load(Ordering::SeqCst) {
            PermissionState::Denied
        } else {
            PermissionState::NotDetermined
        }
    }

    fn request_permission(&self) {
        if preflight_access() || self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Requesting screen recording access");
        request_access();
    }
}

#[cfg(target_os = "macos")]
fn preflight_access() -> bool {
    ffi::preflight_screen_capture_access()
}

#[cfg(not(target_os = "macos"))]
fn preflight_access() -> bool {
    false
}

#[cfg(target_os = "macos")]
fn request_access() {
    ffi::request_screen_capture_access();
}

#[cfg(not(target_os = "macos"))]
fn request_access() {
    tracing::debug!("Screen recording consent is only requested on macOS");
}

/// Grab the current contents of one display.
#[cfg(target_os = "macos")]
pub fn grab_display(id: DisplayId) -> ScreentapResult<DisplayImage> {
    ffi::create_display_image(id.0)
}

#[cfg(not(target_os = "macos"))]
pub fn grab_display(_id: DisplayId) -> ScreentapResult<DisplayImage> {
    Err(ScreentapError::unsupported(
        "CoreGraphics display capture is only available on macOS",
    ))
}
