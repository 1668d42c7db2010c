//! Permission model and capability report for Linux.
//!
//! X11 has no per-application consent: any client on the display can read
//! it. Wayland compositors only hand out screen contents through the XDG
//! ScreenCast portal, which shows a consent dialog.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use screentap_platform_core::{DisplayServer, PermissionGate, PermissionState};

use crate::display::detect_display_server;

const GRANTED: u8 = 0;
const DENIED: u8 = 1;
const NOT_DETERMINED: u8 = 2;

/// Permission gate for the running desktop session.
#[derive(Debug, Clone)]
pub struct DesktopPermissionGate {
    display_server: DisplayServer,
    wayland_state: Arc<AtomicU8>,
    request_in_flight: Arc<AtomicBool>,
}

impl DesktopPermissionGate {
    /// Gate for the display server detected from the environment.
    pub fn new() -> Self {
        Self::for_display_server(detect_display_server())
    }

    pub fn for_display_server(display_server: DisplayServer) -> Self {
        Self {
            display_server,
            wayland_state: Arc::new(AtomicU8::new(NOT_DETERMINED)),
            request_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn display_server(&self) -> DisplayServer {
        self.display_server
    }
}

impl Default for DesktopPermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionGate for DesktopPermissionGate {
    fn state(&self) -> PermissionState {
        match self.display_server {
            DisplayServer::X11 => PermissionState::Granted,
            DisplayServer::Wayland => match self.wayland_state.load(Ordering::SeqCst) {
                GRANTED => PermissionState::Granted,
                DENIED => PermissionState::Denied,
                _ => PermissionState::NotDetermined,
            },
            _ => PermissionState::Denied,
        }
    }

    fn request_permission(&self) {
        if self.display_server != DisplayServer::Wayland
            || self.wayland_state.load(Ordering::SeqCst) != NOT_DETERMINED
        {
            return;
        }
        if self.request_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Portal consent request already in flight");
            return;
        }

        let state = Arc::clone(&self.wayland_state);
        let in_flight = Arc::clone(&self.request_in_flight);
        let spawned = std::thread::Builder::new()
            .name("screentap-portal-consent".to_string())
            .spawn(move || {
                let granted = crate::portal::request_consent_blocking();
                state.store(if granted { GRANTED } else { DENIED }, Ordering::SeqCst);
                in_flight.store(false, Ordering::SeqCst);
                tracing::info!(granted, "Portal consent flow finished");
            });

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "Failed to spawn portal consent thread");
            self.request_in_flight.store(false, Ordering::SeqCst);
        }
    }
}

/// A system capability that Screentap may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    vec![
        check_display_session(),
        check_xrandr(),
        check_portal_support(),
        check_gstreamer(),
    ]
}

fn check_display_session() -> Capability {
    let available = detect_display_server() != DisplayServer::Unknown;

    Capability {
        name: "Desktop Session".to_string(),
        description: "X11 or Wayland session to capture from".to_string(),
        available,
        required: true,
        fix_instructions: if available {
            None
        } else {
            Some(
                "Run inside a graphical desktop session (DISPLAY or WAYLAND_DISPLAY must be set)"
                    .to_string(),
            )
        },
    }
}

fn check_xrandr() -> Capability {
    let available = command_exists("xrandr");

    Capability {
        name: "xrandr".to_string(),
        description: "Display enumeration".to_string(),
        available,
        required: false,
        fix_instructions: if available {
            None
        } else {
            Some("Install xrandr: sudo apt install x11-xserver-utils".to_string())
        },
    }
}

fn check_portal_support() -> Capability {
    let wayland = detect_display_server() == DisplayServer::Wayland;
    let available = !wayland || crate::portal::is_portal_available();

    Capability {
        name: "Screen Capture Portal".to_string(),
        description: "XDG Desktop Portal for screen recording consent (Wayland)".to_string(),
        available,
        required: wayland,
        fix_instructions: if available {
            None
        } else {
            Some("Build with the `portal` feature and install xdg-desktop-portal".to_string())
        },
    }
}

fn check_gstreamer() -> Capability {
    let available = command_exists("gst-inspect-1.0");

    Capability {
        name: "GStreamer".to_string(),
        description: "Native frame capture through ximagesrc".to_string(),
        available,
        required: false,
        fix_instructions: if available {
            None
        } else {
            Some(
                "Install GStreamer: sudo apt install gstreamer1.0-tools gstreamer1.0-plugins-base gstreamer1.0-plugins-good"
                    .to_string(),
            )
        },
    }
}

fn command_exists(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .output()
        .is_ok()
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("Screentap System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x11_is_always_granted() {
        let gate = DesktopPermissionGate::for_display_server(DisplayServer::X11);
        assert!(gate.has_permission());
        gate.request_permission();
        assert_eq!(gate.state(), PermissionState::Granted);
    }

    #[test]
    fn headless_is_denied() {
        let gate = DesktopPermissionGate::for_display_server(DisplayServer::Unknown);
        assert_eq!(gate.state(), PermissionState::Denied);
        gate.request_permission();
        assert_eq!(gate.state(), PermissionState::Denied);
    }

    #[test]
    fn wayland_starts_undetermined() {
        let gate = DesktopPermissionGate::for_display_server(DisplayServer::Wayland);
        assert_eq!(gate.state(), PermissionState::NotDetermined);
        assert!(!gate.has_permission());
    }
}
