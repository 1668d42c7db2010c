//! List attached displays.

use screentap_capture_engine::CaptureContext;
use screentap_common::config::AppConfig;

pub fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let context = CaptureContext::from_config(config)?;
    let displays = context.displays.list_display_info()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&displays)?);
        return Ok(());
    }

    if displays.is_empty() {
        println!("No displays found.");
        return Ok(());
    }

    let primary = context.displays.primary_display().ok();
    println!(
        "{:<5} {:<12} {:<16} {:<13} {:>6} {:>6}  ",
        "INDEX", "ID", "NAME", "SIZE", "SCALE", "HZ"
    );
    for (index, d) in displays.iter().enumerate() {
        println!(
            "{:<5} {:<12} {:<16} {:<13} {:>6.2} {:>6}  {}",
            index,
            d.id,
            d.name,
            format!("{}x{}", d.width, d.height),
            d.scale_factor,
            d.refresh_rate_hz,
            if Some(d.id) == primary { "primary" } else { "" }
        );
    }
    Ok(())
}
