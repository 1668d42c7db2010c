//! CoreGraphics access for displays, grabs, and screen-recording consent.

use core_foundation::data::CFData;
use core_graphics::display::CGDisplay;
use core_graphics::geometry::CGRect;

use screentap_common::error::{ScreentapError, ScreentapResult};

use crate::DisplayImage;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGPreflightScreenCaptureAccess() -> i32;
    fn CGRequestScreenCaptureAccess() -> i32;
}

pub fn main_display_id() -> u32 {
    CGDisplay::main().id
}

pub fn active_display_ids() -> ScreentapResult<Vec<u32>> {
    CGDisplay::active_displays().map_err(|err| {
        ScreentapError::platform(format!("CGGetActiveDisplayList failed with CGError {err}"))
    })
}

pub fn display_pixel_size(id: u32) -> (u32, u32) {
    let display = CGDisplay::new(id);
    (display.pixels_wide() as u32, display.pixels_high() as u32)
}

pub fn display_bounds(id: u32) -> CGRect {
    CGDisplay::new(id).bounds()
}

pub fn preflight_screen_capture_access() -> bool {
    unsafe { (CGPreflightScreenCaptureAccess() & 1) == 1 }
}

pub fn request_screen_capture_access() {
    unsafe {
        CGRequestScreenCaptureAccess();
    }
}

pub fn create_display_image(id: u32) -> ScreentapResult<DisplayImage> {
    let image = CGDisplay::new(id).image().ok_or_else(|| {
        ScreentapError::native_capture(format!("CGDisplayCreateImage returned null for display {id}"))
    })?;

    let data: CFData = image.data();
    Ok(DisplayImage {
        data: data.bytes().to_vec(),
        width: image.width() as u32,
        height: image.height() as u32,
        stride: image.bytes_per_row(),
    })
}
