//! Screentap Capture Engine
//!
//! Delivers live frames from a physical display to an application callback.
//! A [`CaptureSession`] owns one capture's lifecycle; a backend-owned
//! producer hands frames to the session's dispatcher, which invokes the
//! registered callback on a dedicated thread.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    CaptureSession                    │
//! │  state (atomic)   control mutex   callback slot      │
//! │                                                      │
//! │  ┌──────────────┐  FrameSink   ┌──────────────────┐  │
//! │  │ CaptureStream│ ───────────▶ │ bounded channel  │  │
//! │  │ (producer)   │  try_send    │ (drop newest)    │  │
//! │  └──────────────┘              └────────┬─────────┘  │
//! │                                         ▼            │
//! │                              ┌──────────────────┐    │
//! │                              │ dispatch thread  │    │
//! │                              │ state + ordering │    │
//! │                              │ checks, callback │    │
//! │                              └──────────────────┘    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! [`SessionTable`] layers a handle-based API over owned sessions for
//! callers that can only pass primitive values.

pub mod backend;
pub mod dispatcher;
pub mod frame;
pub mod session;
pub mod snapshot;
pub mod table;

pub use backend::{
    select_backend, CaptureBackend, CaptureStream, CoreGraphicsBackend, FrameSource, ManualBackend,
    StreamConfig, SyntheticBackend,
};
pub use dispatcher::{DispatchConfig, DispatchStats, FrameSink, SubmitOutcome};
pub use frame::{CapturedFrame, FrameBuffer, PixelFormat, RawFrame};
pub use session::{CaptureContext, CaptureSession, FrameCallback, SessionState};
pub use snapshot::SnapshotService;
pub use table::{SessionHandle, SessionTable};
