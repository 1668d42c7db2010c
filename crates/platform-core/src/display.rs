//! Display identifiers, descriptors, and the registry contract.

use std::fmt;
use std::sync::RwLock;

use screentap_common::error::{ScreentapError, ScreentapResult};
use serde::{Deserialize, Serialize};

/// Stable numeric identifier of a physical display.
///
/// Only valid while the display stays attached; a stale id surfaces as
/// [`ScreentapError::DisplayNotFound`] when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayId(pub u32);

impl DisplayId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for DisplayId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Information about a connected display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Display name/connector.
    pub name: String,
    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Position in the virtual desktop (pixels).
    pub x: i32,
    pub y: i32,
    /// Scale factor (for example 1.0, 1.25, 2.0).
    pub scale_factor: f64,
    /// Refresh rate in Hz, 0 when unknown.
    pub refresh_rate_hz: u32,
    /// Whether this display is primary.
    pub primary: bool,
}

impl DisplayInfo {
    /// Logical resolution (physical / scale).
    pub fn logical_width(&self) -> u32 {
        (self.width as f64 / self.scale_factor) as u32
    }

    /// Logical resolution (physical / scale).
    pub fn logical_height(&self) -> u32 {
        (self.height as f64 / self.scale_factor) as u32
    }
}

/// Enumerates attached displays.
///
/// Enumeration is not atomic with respect to hot-plug: `display_count` and
/// `list_displays` may disagree if a display is attached between calls.
pub trait DisplayRegistry: Send + Sync {
    /// Detailed information for every attached display, in OS order.
    fn list_display_info(&self) -> ScreentapResult<Vec<DisplayInfo>>;

    /// Identifier of the OS-designated primary display.
    fn primary_display(&self) -> ScreentapResult<DisplayId> {
        let displays = self.list_display_info()?;
        displays
            .iter()
            .find(|d| d.primary)
            .or_else(|| displays.first())
            .map(|d| d.id)
            .ok_or(ScreentapError::NoDisplayFound)
    }

    /// Number of attached displays; 0 when enumeration fails.
    fn display_count(&self) -> usize {
        self.list_display_info().map(|d| d.len()).unwrap_or(0)
    }

    /// Identifiers of every attached display, in OS order.
    fn list_displays(&self) -> Vec<DisplayId> {
        self.list_display_info()
            .map(|displays| displays.into_iter().map(|d| d.id).collect())
            .unwrap_or_default()
    }

    /// Details for one display.
    fn display_info(&self, id: DisplayId) -> ScreentapResult<DisplayInfo> {
        self.list_display_info()?
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ScreentapError::display_not_found(id.0))
    }

    /// Whether `id` currently resolves to an attached display.
    fn contains(&self, id: DisplayId) -> bool {
        self.display_info(id).is_ok()
    }
}

/// A registry backed by a fixed, replaceable list.
///
/// Used by tests and by the synthetic backend; `set_displays` simulates
/// hot-plug.
#[derive(Debug, Default)]
pub struct StaticDisplayRegistry {
    displays: RwLock<Vec<DisplayInfo>>,
}

impl StaticDisplayRegistry {
    pub fn new(displays: Vec<DisplayInfo>) -> Self {
        Self {
            displays: RwLock::new(displays),
        }
    }

    /// A single 1920x1080 primary display with id 1.
    pub fn single() -> Self {
        Self::new(vec![DisplayInfo {
            id: DisplayId(1),
            name: "virtual-0".to_string(),
            width: 1920,
            height: 1080,
            x: 0,
            y: 0,
            scale_factor: 1.0,
            refresh_rate_hz: 60,
            primary: true,
        }])
    }

    /// Replace the attached displays.
    pub fn set_displays(&self, displays: Vec<DisplayInfo>) {
        match self.displays.write() {
            Ok(mut guard) => *guard = displays,
            Err(poisoned) => *poisoned.into_inner() = displays,
        }
    }
}

impl DisplayRegistry for StaticDisplayRegistry {
    fn list_display_info(&self) -> ScreentapResult<Vec<DisplayInfo>> {
        let guard = self
            .displays
            .read()
            .map_err(|_| ScreentapError::platform("display list lock poisoned"))?;
        Ok(guard.clone())
    }
}

/// Resolves a zero-based display index to an identifier.
///
/// Out-of-range indices fall back to the primary display, so a selection
/// made before a monitor was detached still captures something.
pub struct DisplaySelector;

impl DisplaySelector {
    pub fn resolve(registry: &dyn DisplayRegistry, index: usize) -> ScreentapResult<DisplayId> {
        let displays = registry.list_displays();
        match displays.get(index) {
            Some(id) => Ok(*id),
            None => {
                tracing::debug!(
                    index,
                    available = displays.len(),
                    "Display index out of range; falling back to primary"
                );
                registry.primary_display()
            }
        }
    }
}

/// Compute virtual desktop bounds that include all displays.
/// Returns `(min_x, min_y, width, height)` in physical pixels.
pub fn virtual_desktop_bounds(displays: &[DisplayInfo]) -> Option<(i32, i32, u32, u32)> {
    let min_x = displays.iter().map(|d| d.x).min()?;
    let min_y = displays.iter().map(|d| d.y).min()?;
    let max_x = displays.iter().map(|d| d.x + d.width as i32).max()?;
    let max_y = displays.iter().map(|d| d.y + d.height as i32).max()?;

    let width = (max_x - min_x).max(1) as u32;
    let height = (max_y - min_y).max(1) as u32;
    Some((min_x, min_y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(id: u32, x: i32, width: u32, primary: bool) -> DisplayInfo {
        DisplayInfo {
            id: DisplayId(id),
            name: format!("display-{id}"),
            width,
            height: 1080,
            x,
            y: 0,
            scale_factor: 1.0,
            refresh_rate_hz: 60,
            primary,
        }
    }

    #[test]
    fn primary_prefers_flagged_display() {
        let registry =
            StaticDisplayRegistry::new(vec![display(7, -1920, 1920, false), display(3, 0, 2560, true)]);
        assert_eq!(registry.primary_display().unwrap(), DisplayId(3));
    }

    #[test]
    fn primary_falls_back_to_first_display() {
        let registry = StaticDisplayRegistry::new(vec![display(9, 0, 1920, false)]);
        assert_eq!(registry.primary_display().unwrap(), DisplayId(9));
    }

    #[test]
    fn empty_registry_has_no_primary() {
        let registry = StaticDisplayRegistry::new(Vec::new());
        assert!(matches!(
            registry.primary_display(),
            Err(ScreentapError::NoDisplayFound)
        ));
        assert_eq!(registry.display_count(), 0);
        assert!(registry.list_displays().is_empty());
    }

    #[test]
    fn list_length_matches_count() {
        let registry =
            StaticDisplayRegistry::new(vec![display(1, 0, 1920, true), display(2, 1920, 1280, false)]);
        assert_eq!(registry.list_displays().len(), registry.display_count());
        assert_eq!(registry.list_displays(), vec![DisplayId(1), DisplayId(2)]);
    }

    #[test]
    fn unknown_display_is_not_found() {
        let registry = StaticDisplayRegistry::single();
        assert!(matches!(
            registry.display_info(DisplayId(9_999_999)),
            Err(ScreentapError::DisplayNotFound {
                display_id: 9_999_999
            })
        ));
        assert!(!registry.contains(DisplayId(9_999_999)));
    }

    #[test]
    fn hot_unplug_makes_id_stale() {
        let registry = StaticDisplayRegistry::single();
        assert!(registry.contains(DisplayId(1)));
        registry.set_displays(Vec::new());
        assert!(!registry.contains(DisplayId(1)));
    }

    #[test]
    fn selector_falls_back_to_primary() {
        let registry =
            StaticDisplayRegistry::new(vec![display(4, 0, 1920, false), display(5, 1920, 1920, true)]);
        assert_eq!(DisplaySelector::resolve(&registry, 0).unwrap(), DisplayId(4));
        assert_eq!(DisplaySelector::resolve(&registry, 17).unwrap(), DisplayId(5));
    }

    #[test]
    fn virtual_bounds_cover_negative_origin_layout() {
        let displays = vec![display(1, -1920, 1920, false), display(2, 0, 2560, true)];
        let (x, y, w, h) = virtual_desktop_bounds(&displays).unwrap();
        assert_eq!(x, -1920);
        assert_eq!(y, 0);
        assert_eq!(w, 4480);
        assert_eq!(h, 1080);
        assert!(virtual_desktop_bounds(&[]).is_none());
    }

    #[test]
    fn display_id_serializes_as_number() {
        let json = serde_json::to_string(&DisplayId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
