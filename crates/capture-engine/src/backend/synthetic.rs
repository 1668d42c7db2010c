//! Generated test-pattern frames.
//!
//! Always available; used by tests, headless machines, and the CLI's
//! `--backend synthetic`. Frames are a static colour gradient with a white
//! bar that advances each frame, so motion and ordering are visible.

use screentap_common::clock::CaptureClock;
use screentap_common::error::{ScreentapError, ScreentapResult};

use super::polling::{FrameSource, PollingStream};
use super::{CaptureBackend, CaptureStream, StreamConfig};
use crate::frame::{PixelFormat, RawFrame};

const BAR_WIDTH: usize = 8;

#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    fps: u32,
    clock: CaptureClock,
}

impl SyntheticBackend {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            clock: CaptureClock::start(),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(30)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open_stream(&self, config: &StreamConfig) -> ScreentapResult<Box<dyn CaptureStream>> {
        let source = TestPattern::new(config.output_width, config.output_height)?;
        tracing::debug!(
            display_id = %config.display.id,
            width = config.output_width,
            height = config.output_height,
            fps = self.fps,
            "Opening synthetic stream"
        );
        Ok(Box::new(PollingStream::new(
            "synthetic",
            self.fps,
            self.clock.clone(),
            Box::new(source),
        )))
    }
}

struct TestPattern {
    width: u32,
    height: u32,
    base: Vec<u8>,
    frame_index: usize,
}

impl TestPattern {
    fn new(width: u32, height: u32) -> ScreentapResult<Self> {
        if width == 0 || height == 0 {
            return Err(ScreentapError::native_capture(format!(
                "cannot generate a {width}x{height} test pattern"
            )));
        }
        let (w, h) = (width as usize, height as usize);
        let mut base = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                base.extend_from_slice(&[
                    (x * 255 / w) as u8,
                    (y * 255 / h) as u8,
                    ((x + y) * 255 / (w + h)) as u8,
                    255,
                ]);
            }
        }
        Ok(Self {
            width,
            height,
            base,
            frame_index: 0,
        })
    }

    fn render(&self) -> Vec<u8> {
        let w = self.width as usize;
        let mut data = self.base.clone();
        let start = (self.frame_index * BAR_WIDTH) % w;
        let end = (start + BAR_WIDTH).min(w);
        for row in data.chunks_exact_mut(w * 4) {
            row[start * 4..end * 4].fill(255);
        }
        data
    }
}

impl FrameSource for TestPattern {
    fn grab(&mut self, timestamp_ns: u64) -> ScreentapResult<RawFrame<'static>> {
        let data = self.render();
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(RawFrame::owned(
            data,
            self.width,
            self.height,
            self.width as usize * 4,
            PixelFormat::Bgra,
            timestamp_ns,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_has_requested_geometry() {
        let mut pattern = TestPattern::new(16, 9).unwrap();
        let frame = pattern.grab(5).unwrap();
        assert_eq!((frame.width, frame.height, frame.stride), (16, 9, 64));
        assert_eq!(frame.data.len(), 16 * 9 * 4);
        assert_eq!(frame.timestamp_ns, 5);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn bar_moves_between_frames() {
        let mut pattern = TestPattern::new(32, 2).unwrap();
        let first = pattern.grab(0).unwrap().data.into_owned();
        let second = pattern.grab(1).unwrap().data.into_owned();
        assert_ne!(first, second);
        // Bar starts at the left edge.
        assert_eq!(&first[..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(TestPattern::new(0, 10).is_err());
    }
}
