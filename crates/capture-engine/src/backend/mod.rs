//! Native capture backends.
//!
//! A backend turns a [`StreamConfig`] into a [`CaptureStream`]; the stream
//! owns the producer (a GStreamer streaming thread, a polling thread, ...)
//! and pushes frames into the [`FrameSink`] it was started with.

use std::sync::Arc;

use screentap_common::config::BackendKind;
use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::{fit_within, DisplayInfo};

use crate::dispatcher::FrameSink;

pub mod coregraphics;
#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod manual;
mod polling;
pub mod synthetic;

pub use coregraphics::CoreGraphicsBackend;
pub use manual::ManualBackend;
pub use polling::FrameSource;
pub use synthetic::SyntheticBackend;

/// Parameters of one native stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub display: DisplayInfo,
    /// Requested bounds; 0 leaves the dimension unconstrained.
    pub max_width: u32,
    pub max_height: u32,
    /// Size every delivered frame must have.
    pub output_width: u32,
    pub output_height: u32,
}

impl StreamConfig {
    pub fn new(display: DisplayInfo, max_width: u32, max_height: u32) -> Self {
        let (output_width, output_height) =
            fit_within(display.width, display.height, max_width, max_height);
        Self {
            display,
            max_width,
            max_height,
            output_width,
            output_height,
        }
    }

    /// Whether output differs from the display's native pixel size.
    pub fn is_scaled(&self) -> bool {
        (self.output_width, self.output_height) != (self.display.width, self.display.height)
    }
}

/// Factory for native capture streams.
pub trait CaptureBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Configure a stream for one display. Nothing is produced until
    /// [`CaptureStream::start`].
    fn open_stream(&self, config: &StreamConfig) -> ScreentapResult<Box<dyn CaptureStream>>;
}

/// A configured native stream.
pub trait CaptureStream: Send {
    /// Begin producing frames into `sink`.
    fn start(&mut self, sink: FrameSink) -> ScreentapResult<()>;

    /// Stop producing. The producer must not be running once this returns.
    fn stop(&mut self) -> ScreentapResult<()>;
}

/// Resolve a configured backend kind to a backend instance.
///
/// `Auto` prefers CoreGraphics on macOS and GStreamer when compiled in,
/// and otherwise falls back to the synthetic test pattern.
pub fn select_backend(kind: BackendKind, fps: u32) -> ScreentapResult<Arc<dyn CaptureBackend>> {
    match kind {
        BackendKind::Synthetic => Ok(Arc::new(SyntheticBackend::new(fps))),
        BackendKind::Gstreamer => gstreamer_backend(fps),
        BackendKind::Coregraphics => coregraphics_backend(fps),
        BackendKind::Auto => {
            if cfg!(target_os = "macos") {
                coregraphics_backend(fps)
            } else if cfg!(feature = "gstreamer") {
                gstreamer_backend(fps)
            } else {
                tracing::warn!("No native capture backend compiled in; using synthetic frames");
                Ok(Arc::new(SyntheticBackend::new(fps)))
            }
        }
    }
}

#[cfg(feature = "gstreamer")]
fn gstreamer_backend(fps: u32) -> ScreentapResult<Arc<dyn CaptureBackend>> {
    Ok(Arc::new(gstreamer::GstreamerBackend::new(fps)?))
}

#[cfg(not(feature = "gstreamer"))]
fn gstreamer_backend(_fps: u32) -> ScreentapResult<Arc<dyn CaptureBackend>> {
    Err(ScreentapError::unsupported(
        "built without the `gstreamer` feature",
    ))
}

fn coregraphics_backend(fps: u32) -> ScreentapResult<Arc<dyn CaptureBackend>> {
    if cfg!(target_os = "macos") {
        Ok(Arc::new(CoreGraphicsBackend::new(fps)))
    } else {
        Err(ScreentapError::unsupported(
            "CoreGraphics capture is only available on macOS",
        ))
    }
}
