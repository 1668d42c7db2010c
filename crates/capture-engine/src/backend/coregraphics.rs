//! CoreGraphics display polling (macOS).
//!
//! Grabs a full display image at the configured rate and downscales it on
//! the producer thread when the session asked for bounded output.

use screentap_common::clock::CaptureClock;
use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::{downscale_bgra, DisplayId, BGRA_BYTES_PER_PIXEL};
use screentap_platform_macos::grab_display;

use super::polling::{FrameSource, PollingStream};
use super::{CaptureBackend, CaptureStream, StreamConfig};
use crate::frame::{PixelFormat, RawFrame};

#[derive(Debug, Clone)]
pub struct CoreGraphicsBackend {
    fps: u32,
    clock: CaptureClock,
}

impl CoreGraphicsBackend {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            clock: CaptureClock::start(),
        }
    }
}

impl CaptureBackend for CoreGraphicsBackend {
    fn name(&self) -> &'static str {
        "coregraphics"
    }

    fn open_stream(&self, config: &StreamConfig) -> ScreentapResult<Box<dyn CaptureStream>> {
        // Fail at start rather than on the first tick if the display cannot be read.
        grab_display(config.display.id)?;
        Ok(Box::new(PollingStream::new(
            "coregraphics",
            self.fps,
            self.clock.clone(),
            Box::new(DisplayPoller {
                display_id: config.display.id,
                output_width: config.output_width,
                output_height: config.output_height,
            }),
        )))
    }
}

struct DisplayPoller {
    display_id: DisplayId,
    output_width: u32,
    output_height: u32,
}

impl FrameSource for DisplayPoller {
    fn grab(&mut self, timestamp_ns: u64) -> ScreentapResult<RawFrame<'static>> {
        let image = grab_display(self.display_id)?;
        if (image.width, image.height) == (self.output_width, self.output_height) {
            return Ok(RawFrame::owned(
                image.data,
                image.width,
                image.height,
                image.stride,
                PixelFormat::Bgra,
                timestamp_ns,
            ));
        }

        let data = downscale_bgra(
            &image.data,
            image.width,
            image.height,
            image.stride,
            self.output_width,
            self.output_height,
        )
        .ok_or_else(|| {
            ScreentapError::native_capture(format!(
                "display {} returned a truncated {}x{} image",
                self.display_id, image.width, image.height
            ))
        })?;
        Ok(RawFrame::owned(
            data,
            self.output_width,
            self.output_height,
            self.output_width as usize * BGRA_BYTES_PER_PIXEL,
            PixelFormat::Bgra,
            timestamp_ns,
        ))
    }
}
