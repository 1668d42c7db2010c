//! Screen-recording permission contract.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use screentap_common::error::{ScreentapError, ScreentapResult};
use serde::{Deserialize, Serialize};

/// Process-wide screen-recording consent, as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    NotDetermined,
}

impl PermissionState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Granted => 0,
            Self::Denied => 1,
            Self::NotDetermined => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Granted,
            1 => Self::Denied,
            _ => Self::NotDetermined,
        }
    }
}

/// Queries and requests the OS screen-recording permission.
pub trait PermissionGate: Send + Sync {
    /// Current OS-granted state. Must not block.
    fn state(&self) -> PermissionState;

    /// Whether capture is currently allowed.
    fn has_permission(&self) -> bool {
        self.state() == PermissionState::Granted
    }

    /// Trigger the OS consent flow when the state is not yet determined.
    ///
    /// The outcome is not returned; callers re-poll [`Self::has_permission`].
    /// Calling this once the state is granted or denied has no effect.
    fn request_permission(&self);
}

/// Request consent if needed, wait `wait`, and re-check.
pub fn ensure_permission(gate: &dyn PermissionGate, wait: Duration) -> ScreentapResult<()> {
    if gate.has_permission() {
        return Ok(());
    }

    tracing::info!("Screen recording permission required; requesting consent");
    gate.request_permission();
    std::thread::sleep(wait);

    if gate.has_permission() {
        Ok(())
    } else {
        tracing::warn!(state = ?gate.state(), "Screen recording permission not granted");
        Err(ScreentapError::PermissionDenied)
    }
}

/// A scriptable permission gate for tests and headless use.
#[derive(Debug)]
pub struct StaticPermissionGate {
    state: AtomicU8,
    on_request: PermissionState,
    requests: AtomicU32,
}

impl StaticPermissionGate {
    /// A gate that stays in `state`; requests are counted but change nothing.
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: AtomicU8::new(state.to_u8()),
            on_request: state,
            requests: AtomicU32::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionState::Denied)
    }

    /// Starts undetermined and resolves to `outcome` on the first request.
    pub fn prompting(outcome: PermissionState) -> Self {
        Self {
            state: AtomicU8::new(PermissionState::NotDetermined.to_u8()),
            on_request: outcome,
            requests: AtomicU32::new(0),
        }
    }

    /// Force the reported state, e.g. to simulate revocation in settings.
    pub fn set_state(&self, state: PermissionState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Number of times consent was requested.
    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionGate for StaticPermissionGate {
    fn state(&self) -> PermissionState {
        PermissionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn request_permission(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            PermissionState::NotDetermined.to_u8(),
            self.on_request.to_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}
