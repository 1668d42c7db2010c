//! Error types shared across Screentap crates.

/// Top-level error type for Screentap operations.
#[derive(Debug, thiserror::Error)]
pub enum ScreentapError {
    #[error("Screen recording permission denied")]
    PermissionDenied,

    #[error("Display {display_id} not found")]
    DisplayNotFound { display_id: u32 },

    #[error("No display found")]
    NoDisplayFound,

    #[error("Session is already capturing")]
    AlreadyCapturing,

    #[error("Native capture error: {message}")]
    NativeCapture { message: String },

    #[error("Invalid or destroyed session handle")]
    InvalidHandle,

    #[error("Platform error: {message}")]
    Platform { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ScreentapError.
pub type ScreentapResult<T> = Result<T, ScreentapError>;

impl ScreentapError {
    pub fn display_not_found(display_id: u32) -> Self {
        Self::DisplayNotFound { display_id }
    }

    pub fn native_capture(msg: impl Into<String>) -> Self {
        Self::NativeCapture {
            message: msg.into(),
        }
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    /// Numeric status code for callers that cross a primitive-only boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PermissionDenied => StatusCode::PermissionDenied,
            Self::DisplayNotFound { .. } => StatusCode::DisplayNotFound,
            Self::NoDisplayFound => StatusCode::NoDisplayFound,
            Self::AlreadyCapturing => StatusCode::AlreadyCapturing,
            Self::NativeCapture { .. } => StatusCode::NativeCaptureError,
            Self::InvalidHandle => StatusCode::InvalidHandle,
            _ => StatusCode::Other,
        }
    }

    /// Whether the caller is expected to re-check state and retry.
    ///
    /// Permission and display enumeration can change underneath a caller
    /// (consent granted later, monitor re-attached).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::DisplayNotFound { .. } | Self::NoDisplayFound
        )
    }
}

/// Status codes returned by the primitive boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    PermissionDenied = 1,
    DisplayNotFound = 2,
    AlreadyCapturing = 3,
    NativeCaptureError = 4,
    InvalidHandle = 5,
    NoDisplayFound = 6,
    Other = 255,
}

impl StatusCode {
    /// Collapse a result into its status code.
    pub fn of<T>(result: &ScreentapResult<T>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(e) => e.status_code(),
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ScreentapError::PermissionDenied.status_code(),
            StatusCode::PermissionDenied
        );
        assert_eq!(
            ScreentapError::display_not_found(9_999_999).status_code(),
            StatusCode::DisplayNotFound
        );
        assert_eq!(
            ScreentapError::native_capture("rejected").status_code(),
            StatusCode::NativeCaptureError
        );
        assert_eq!(
            ScreentapError::config("bad").status_code(),
            StatusCode::Other
        );
    }

    #[test]
    fn status_of_ok_result_is_zero() {
        let ok: ScreentapResult<()> = Ok(());
        assert_eq!(StatusCode::of(&ok).as_i32(), 0);

        let err: ScreentapResult<()> = Err(ScreentapError::InvalidHandle);
        assert_eq!(StatusCode::of(&err).as_i32(), 5);
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ScreentapError::PermissionDenied.is_transient());
        assert!(ScreentapError::display_not_found(3).is_transient());
        assert!(!ScreentapError::AlreadyCapturing.is_transient());
        assert!(!ScreentapError::InvalidHandle.is_transient());
    }

    #[test]
    fn display_not_found_message_names_the_display() {
        let msg = ScreentapError::display_not_found(42).to_string();
        assert!(msg.contains("42"));
    }
}
