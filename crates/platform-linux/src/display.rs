//! Display detection via `xrandr`.

use std::process::Command;

use screentap_common::error::{ScreentapError, ScreentapResult};
use screentap_platform_core::{DisplayId, DisplayInfo, DisplayRegistry, DisplayServer};

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// Stable id for a connector name (FNV-1a, never zero).
pub fn display_id_for_connector(name: &str) -> DisplayId {
    let mut hash: u32 = 0x811c9dc5;
    for byte in name.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    DisplayId(hash.max(1))
}

/// Registry backed by `xrandr --query`.
///
/// Every call re-enumerates, so hot-plugged displays show up immediately
/// and detached ones disappear.
#[derive(Debug, Clone, Default)]
pub struct XrandrDisplayRegistry {
    /// Report a single default display when `xrandr` is unavailable but a
    /// graphical session exists.
    fallback_default: bool,
}

impl XrandrDisplayRegistry {
    pub fn new() -> Self {
        Self {
            fallback_default: true,
        }
    }

    /// Never fabricate a display; an unavailable `xrandr` yields an error.
    pub fn strict() -> Self {
        Self {
            fallback_default: false,
        }
    }
}

impl DisplayRegistry for XrandrDisplayRegistry {
    fn list_display_info(&self) -> ScreentapResult<Vec<DisplayInfo>> {
        tracing::debug!("Detecting displays via xrandr");

        match Command::new("xrandr").arg("--query").output() {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Ok(parse_xrandr(&stdout))
            }
            Ok(output) => self.fallback(format!(
                "xrandr exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => self.fallback(format!("failed to run xrandr: {e}")),
        }
    }
}

impl XrandrDisplayRegistry {
    fn fallback(&self, reason: String) -> ScreentapResult<Vec<DisplayInfo>> {
        if !self.fallback_default || detect_display_server() == DisplayServer::Unknown {
            return Err(ScreentapError::platform(reason));
        }
        tracing::warn!(%reason, "Display enumeration unavailable; assuming one default display");
        Ok(vec![DisplayInfo {
            id: display_id_for_connector("default"),
            name: "default".to_string(),
            width: 1920,
            height: 1080,
            x: 0,
            y: 0,
            scale_factor: 1.0,
            refresh_rate_hz: 60,
            primary: true,
        }])
    }
}

/// Parse `xrandr --query` output into connected, active displays.
pub fn parse_xrandr(output: &str) -> Vec<DisplayInfo> {
    let mut displays: Vec<DisplayInfo> = Vec::new();
    let mut current: Option<usize> = None;

    for line in output.lines() {
        if line.starts_with(char::is_whitespace) {
            if let (Some(idx), Some(rate)) = (current, active_refresh_rate(line)) {
                displays[idx].refresh_rate_hz = rate;
            }
            continue;
        }

        current = None;
        let mut tokens = line.split_whitespace();
        let (Some(name), Some("connected")) = (tokens.next(), tokens.next()) else {
            continue;
        };

        let rest: Vec<&str> = tokens.collect();
        let primary = rest.contains(&"primary");
        let Some((width, height, x, y)) = rest.iter().find_map(|t| parse_geometry(t)) else {
            // Connected but not part of the desktop (output disabled).
            continue;
        };

        displays.push(DisplayInfo {
            id: display_id_for_connector(name),
            name: name.to_string(),
            width,
            height,
            x,
            y,
            scale_factor: 1.0,
            refresh_rate_hz: 0,
            primary,
        });
        current = Some(displays.len() - 1);
    }

    displays
}

/// Parse `WIDTHxHEIGHT+X+Y` (offsets may be negative, e.g. `+-1920`).
fn parse_geometry(token: &str) -> Option<(u32, u32, i32, i32)> {
    let (size, offsets) = token.split_once('+')?;
    let (w, h) = size.split_once('x')?;
    let (x, y) = offsets.split_once('+')?;
    Some((w.parse().ok()?, h.parse().ok()?, x.parse().ok()?, y.parse().ok()?))
}

/// Refresh rate of the mode marked current (`*`) on a mode line.
fn active_refresh_rate(line: &str) -> Option<u32> {
    line.split_whitespace()
        .skip(1)
        .find(|t| t.contains('*'))
        .and_then(|t| t.trim_end_matches(['*', '+']).parse::<f64>().ok())
        .map(|hz| hz.round() as u32)
}
