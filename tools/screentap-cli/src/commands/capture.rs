//! Capture for a fixed duration and report delivery statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use screentap_capture_engine::{CaptureContext, CaptureSession};
use screentap_common::config::AppConfig;
use screentap_platform_core::ensure_permission;

use crate::TargetArgs;

#[derive(Default)]
struct FrameTally {
    frames: AtomicU64,
    bytes: AtomicU64,
    last_width: AtomicU64,
    last_height: AtomicU64,
}

pub async fn run(
    config: &AppConfig,
    target: TargetArgs,
    seconds: u64,
    json: bool,
) -> anyhow::Result<()> {
    let context = CaptureContext::from_config(config)?;
    ensure_permission(
        context.permissions.as_ref(),
        Duration::from_millis(config.permission.request_wait_ms),
    )?;
    let target = target.resolve(&context, config)?;

    let session = CaptureSession::new(context);
    let tally = Arc::new(FrameTally::default());
    let counter = Arc::clone(&tally);
    session.set_frame_callback(move |frame| {
        counter.frames.fetch_add(1, Ordering::Relaxed);
        counter
            .bytes
            .fetch_add(frame.byte_len() as u64, Ordering::Relaxed);
        counter
            .last_width
            .store(frame.width as u64, Ordering::Relaxed);
        counter
            .last_height
            .store(frame.height as u64, Ordering::Relaxed);
    })?;

    session.start(target.display_id, target.max_width, target.max_height)?;
    if !json {
        println!(
            "Capturing display {} for {seconds}s (Ctrl+C to stop)...",
            target.display_id
        );
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    // stop joins the dispatch thread; keep it off the async workers.
    let session = tokio::task::spawn_blocking(move || {
        let result = session.stop();
        (session, result)
    })
    .await?;
    let (session, stopped) = session;
    stopped?;

    let stats = session.stats();
    session.destroy();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let frames = tally.frames.load(Ordering::Relaxed);
    println!();
    println!(
        "Frames delivered: {frames} ({:.1} fps)",
        frames as f64 / seconds.max(1) as f64
    );
    println!(
        "Last frame size:  {}x{}",
        tally.last_width.load(Ordering::Relaxed),
        tally.last_height.load(Ordering::Relaxed)
    );
    println!(
        "Pixel data:       {:.1} MiB",
        tally.bytes.load(Ordering::Relaxed) as f64 / (1024.0 * 1024.0)
    );
    println!("Frames received:  {}", stats.frames_received);
    println!(
        "Dropped:          {} (backpressure {}, inactive {}, out of order {}, malformed {})",
        stats.frames_dropped(),
        stats.frames_dropped_backpressure,
        stats.frames_dropped_inactive,
        stats.frames_dropped_out_of_order,
        stats.frames_dropped_malformed
    );
    Ok(())
}
