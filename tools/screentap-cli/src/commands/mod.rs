pub mod capture;
pub mod check;
pub mod displays;
pub mod snapshot;

use screentap_capture_engine::CaptureContext;
use screentap_common::config::AppConfig;
use screentap_platform_core::{DisplayId, DisplaySelector};

use crate::TargetArgs;

/// Resolved capture target.
pub struct Target {
    pub display_id: DisplayId,
    pub max_width: u32,
    pub max_height: u32,
}

impl TargetArgs {
    pub fn resolve(&self, context: &CaptureContext, config: &AppConfig) -> anyhow::Result<Target> {
        let display_id = match (self.display, self.index) {
            (Some(id), _) => DisplayId(id),
            (None, Some(index)) => DisplaySelector::resolve(context.displays.as_ref(), index)?,
            (None, None) => context.displays.primary_display()?,
        };
        Ok(Target {
            display_id,
            max_width: self.max_width.unwrap_or(config.capture.max_width),
            max_height: self.max_height.unwrap_or(config.capture.max_height),
        })
    }
}
