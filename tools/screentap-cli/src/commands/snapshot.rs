//! Write one frame to disk as raw BGRA plus a JSON sidecar.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use screentap_capture_engine::{CaptureContext, PixelFormat, SnapshotService};
use screentap_common::config::AppConfig;
use serde::Serialize;

use crate::TargetArgs;

#[derive(Serialize)]
struct SnapshotMeta {
    display_id: u32,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    timestamp_ns: u64,
}

pub fn run(
    config: &AppConfig,
    target: TargetArgs,
    output: PathBuf,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let context = CaptureContext::from_config(config)?;
    let target = target.resolve(&context, config)?;

    let mut service = SnapshotService::from_config(context, config);
    if let Some(ms) = timeout_ms {
        service = service.with_frame_timeout(Duration::from_millis(ms));
    }
    let frame = service.capture_frame(
        Some(target.display_id),
        target.max_width,
        target.max_height,
    )?;

    std::fs::write(&output, &frame.data)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let meta = SnapshotMeta {
        display_id: frame.display_id.get(),
        width: frame.width,
        height: frame.height,
        stride: frame.stride,
        format: frame.format,
        timestamp_ns: frame.timestamp_ns,
    };
    let mut meta_path = output.clone().into_os_string();
    meta_path.push(".json");
    let meta_path = PathBuf::from(meta_path);
    std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
        .with_context(|| format!("Failed to write {}", meta_path.display()))?;

    println!(
        "Wrote {}x{} frame from display {} to {} ({} bytes, stride {})",
        frame.width,
        frame.height,
        frame.display_id,
        output.display(),
        frame.data.len(),
        frame.stride
    );
    Ok(())
}
