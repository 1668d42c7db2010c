//! Screentap Linux Platform Integration
//!
//! Platform-specific implementations for Linux:
//! - **Display Detection:** `xrandr`-based display enumeration
//! - **Permissions:** X11/Wayland consent model and capability report
//! - **XDG Desktop Portal:** ScreenCast consent on Wayland (feature `portal`)

pub mod display;
pub mod permissions;
pub mod portal;

pub use display::*;
pub use permissions::DesktopPermissionGate;
