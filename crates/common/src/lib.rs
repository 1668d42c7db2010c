//! Screentap Common Utilities
//!
//! Shared infrastructure for all Screentap crates:
//! - Error taxonomy, result alias, and boundary status codes
//! - Monotonic capture clock for frame timestamps
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
