//! GStreamer `ximagesrc` capture (Linux, X11).
//!
//! The pipeline crops the X root window to the display's rectangle,
//! scales to the stream's output size, and hands BGRx buffers to an
//! `appsink` whose `new-sample` signal pushes them into the session sink.

use std::sync::OnceLock;

use gst::prelude::*;
use gstreamer as gst;
use screentap_common::clock::CaptureClock;
use screentap_common::error::{ScreentapError, ScreentapResult};

use super::{CaptureBackend, CaptureStream, StreamConfig};
use crate::dispatcher::FrameSink;
use crate::frame::{PixelFormat, RawFrame};

const APPSINK_NAME: &str = "screentap_frames";

#[derive(Debug, Clone)]
pub struct GstreamerBackend {
    fps: u32,
    clock: CaptureClock,
}

impl GstreamerBackend {
    pub fn new(fps: u32) -> ScreentapResult<Self> {
        init_gstreamer()?;
        Ok(Self {
            fps: fps.max(1),
            clock: CaptureClock::start(),
        })
    }
}

impl CaptureBackend for GstreamerBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open_stream(&self, config: &StreamConfig) -> ScreentapResult<Box<dyn CaptureStream>> {
        let launch = launch_description(config, self.fps)?;
        tracing::debug!(display_id = %config.display.id, %launch, "Building capture pipeline");

        let element = gst::parse::launch(&launch).map_err(|e| {
            ScreentapError::native_capture(format!("Failed to build pipeline: {e}"))
        })?;
        let pipeline = element.dynamic_cast::<gst::Pipeline>().map_err(|_| {
            ScreentapError::native_capture("Launch string did not produce a pipeline")
        })?;
        let appsink = pipeline.by_name(APPSINK_NAME).ok_or_else(|| {
            ScreentapError::native_capture("Pipeline is missing its appsink")
        })?;

        Ok(Box::new(GstreamerStream {
            pipeline,
            appsink,
            clock: self.clock.clone(),
            display: config.display.id.to_string(),
            running: false,
        }))
    }
}

struct GstreamerStream {
    pipeline: gst::Pipeline,
    appsink: gst::Element,
    clock: CaptureClock,
    display: String,
    running: bool,
}

impl CaptureStream for GstreamerStream {
    fn start(&mut self, sink: FrameSink) -> ScreentapResult<()> {
        let clock = self.clock.clone();
        self.appsink.connect("new-sample", false, move |values| {
            let flow = match values.first().map(|v| v.get::<gst::Element>()) {
                Some(Ok(appsink)) => forward_sample(&appsink, &sink, &clock),
                _ => gst::FlowReturn::Error,
            };
            Some(flow.to_value())
        });

        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            ScreentapError::native_capture(format!(
                "Failed to start capture pipeline for display {}: {e:?}",
                self.display
            ))
        })?;

        // State changes are asynchronous; wait until ximagesrc has opened the display.
        match self.pipeline.state(gst::ClockTime::from_seconds(5)) {
            (Ok(_), gst::State::Playing, _) => {}
            (Ok(_), state, _) => {
                tracing::warn!(
                    display = %self.display,
                    ?state,
                    "Pipeline did not reach Playing state within timeout"
                );
            }
            (Err(e), _, _) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(ScreentapError::native_capture(format!(
                    "Capture pipeline for display {} failed to reach Playing state: {e:?}",
                    self.display
                )));
            }
        }

        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> ScreentapResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        // Null joins the streaming thread, so no `new-sample` runs after this.
        self.pipeline.set_state(gst::State::Null).map_err(|e| {
            ScreentapError::native_capture(format!(
                "Failed to stop capture pipeline for display {}: {e:?}",
                self.display
            ))
        })?;
        Ok(())
    }
}

impl Drop for GstreamerStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(display = %self.display, error = %e, "Pipeline teardown failed");
        }
    }
}

fn forward_sample(appsink: &gst::Element, sink: &FrameSink, clock: &CaptureClock) -> gst::FlowReturn {
    let timestamp_ns = clock.elapsed_ns();
    let Some(sample) = appsink.emit_by_name::<Option<gst::Sample>>("pull-sample", &[]) else {
        return gst::FlowReturn::Eos;
    };
    let Some((width, height)) = sample_dimensions(&sample) else {
        tracing::warn!("Sample without video dimensions");
        return gst::FlowReturn::Ok;
    };
    let Some(buffer) = sample.buffer() else {
        return gst::FlowReturn::Ok;
    };
    let Ok(map) = buffer.map_readable() else {
        tracing::warn!("Failed to map sample buffer");
        return gst::FlowReturn::Ok;
    };

    // BGRx rows are 4-byte aligned, so the default stride is unpadded.
    let frame = RawFrame::borrowed(
        map.as_slice(),
        width,
        height,
        width as usize * 4,
        PixelFormat::Bgrx,
        timestamp_ns,
    );
    sink.submit(frame);
    gst::FlowReturn::Ok
}

fn sample_dimensions(sample: &gst::Sample) -> Option<(u32, u32)> {
    let structure = sample.caps()?.structure(0)?;
    let width = structure.get::<i32>("width").ok()?;
    let height = structure.get::<i32>("height").ok()?;
    Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
}

fn launch_description(config: &StreamConfig, fps: u32) -> ScreentapResult<String> {
    let display = &config.display;
    let region = capture_region_fragment(display.x, display.y, display.width, display.height)?;
    let (width, height) = (config.output_width, config.output_height);
    // `use-damage=false` ensures full frames rather than damage-only updates.
    Ok(format!(
        "ximagesrc use-damage=false show-pointer=true{region} ! videoconvert ! videoscale ! videorate ! video/x-raw,format=BGRx,width={width},height={height},framerate={fps}/1 ! appsink name={APPSINK_NAME} emit-signals=true max-buffers=1 drop=true sync=false"
    ))
}

fn capture_region_fragment(x: i32, y: i32, width: u32, height: u32) -> ScreentapResult<String> {
    if width == 0 || height == 0 {
        return Err(ScreentapError::native_capture(format!(
            "Invalid X11 capture region {width}x{height} at ({x},{y})"
        )));
    }

    let width_i32 = i32::try_from(width).map_err(|_| {
        ScreentapError::native_capture(format!("X11 capture width too large: {width}"))
    })?;
    let height_i32 = i32::try_from(height).map_err(|_| {
        ScreentapError::native_capture(format!("X11 capture height too large: {height}"))
    })?;

    let endx = x
        .checked_add(width_i32 - 1)
        .ok_or_else(|| ScreentapError::native_capture("X11 capture region x-range overflow"))?;
    let endy = y
        .checked_add(height_i32 - 1)
        .ok_or_else(|| ScreentapError::native_capture("X11 capture region y-range overflow"))?;

    Ok(format!(" startx={x} starty={y} endx={endx} endy={endy}"))
}

fn init_gstreamer() -> ScreentapResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(ScreentapError::native_capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screentap_platform_core::{DisplayId, DisplayInfo};

    #[test]
    fn region_fragment_uses_inclusive_end_coordinates() {
        let fragment = capture_region_fragment(2560, 0, 2560, 1440).unwrap();
        assert_eq!(fragment, " startx=2560 starty=0 endx=5119 endy=1439");
    }

    #[test]
    fn region_fragment_rejects_zero_size() {
        let err = capture_region_fragment(0, 0, 0, 1080).unwrap_err();
        assert!(err.to_string().contains("Invalid X11 capture region"));
    }

    #[test]
    fn launch_scales_to_output_size() {
        let display = DisplayInfo {
            id: DisplayId(3),
            name: "HDMI-1".into(),
            width: 1920,
            height: 1080,
            x: 1920,
            y: 0,
            scale_factor: 1.0,
            refresh_rate_hz: 60,
            primary: false,
        };
        let launch = launch_description(&StreamConfig::new(display, 640, 0), 15).unwrap();
        assert!(launch.contains("startx=1920 starty=0 endx=3839 endy=1079"));
        assert!(launch.contains("format=BGRx,width=640,height=360,framerate=15/1"));
        assert!(launch.contains(&format!("appsink name={APPSINK_NAME}")));
    }
}
