//! Check system capabilities.

use std::time::Duration;

use screentap_capture_engine::CaptureContext;
use screentap_common::config::AppConfig;
use screentap_platform_core::{ensure_permission, PermissionState};

pub fn run(config: &AppConfig, request: bool) -> anyhow::Result<()> {
    println!("Screentap System Check");
    println!("{}", "=".repeat(50));

    print_display_server();

    let context = CaptureContext::from_config(config)?;
    println!("[OK] Capture backend: {}", context.backend.name());

    if request {
        let wait = Duration::from_millis(config.permission.request_wait_ms);
        if let Err(e) = ensure_permission(context.permissions.as_ref(), wait) {
            tracing::debug!(error = %e, "Consent request did not grant permission");
        }
    }
    match context.permissions.state() {
        PermissionState::Granted => println!("[OK] Screen recording permission: granted"),
        PermissionState::Denied => println!("[FAIL] Screen recording permission: denied"),
        PermissionState::NotDetermined => {
            println!("[WARN] Screen recording permission: not determined (run with --request)")
        }
    }

    let displays = context.displays.list_display_info()?;
    let primary = context.displays.primary_display().ok();
    println!("[OK] Displays detected: {}", displays.len());
    for d in &displays {
        println!(
            "     #{} {} {}x{} at ({},{}) @ {}Hz (scale: {}x) {}",
            d.id,
            d.name,
            d.width,
            d.height,
            d.x,
            d.y,
            d.refresh_rate_hz,
            d.scale_factor,
            if Some(d.id) == primary { "(primary)" } else { "" }
        );
    }

    print_capabilities();
    Ok(())
}

#[cfg(target_os = "macos")]
fn print_display_server() {
    println!("[OK] Display server: macOS (CoreGraphics)");
}

#[cfg(not(target_os = "macos"))]
fn print_display_server() {
    use screentap_platform_core::DisplayServer;
    use screentap_platform_linux::detect_display_server;

    match detect_display_server() {
        DisplayServer::Wayland => println!("[OK] Display server: Wayland"),
        DisplayServer::X11 => println!("[OK] Display server: X11"),
        _ => println!("[WARN] Display server: Unknown"),
    }
}

#[cfg(target_os = "macos")]
fn print_capabilities() {}

#[cfg(not(target_os = "macos"))]
fn print_capabilities() {
    use screentap_platform_linux::permissions::{check_capabilities, print_capability_report};

    let capabilities = check_capabilities();
    println!();
    print_capability_report(&capabilities);

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. Screentap is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }
}
