//! Screentap platform core contracts.
//!
//! This crate contains the display and permission capabilities consumed by
//! the capture engine, without coupling to a concrete OS backend. Each
//! platform crate implements [`DisplayRegistry`] and [`PermissionGate`];
//! the static implementations here stand in for the OS in tests.

pub mod display;
pub mod geometry;
pub mod permission;

pub use display::*;
pub use geometry::*;
pub use permission::*;

use serde::{Deserialize, Serialize};

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    MacOS,
    #[default]
    Unknown,
}
