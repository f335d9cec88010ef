//! Error types for window operations.

use thiserror::Error;

/// Errors that can occur during window operations.
#[derive(Debug, Error)]
pub enum WindowError {
    /// No window engine exists for the current platform.
    #[error("platform not supported")]
    PlatformNotSupported,

    /// `open` was called on a window that is already open.
    #[error("window already open")]
    AlreadyOpen,

    /// The window was closed and cannot be reopened.
    #[error("window has been closed and cannot be reused")]
    AlreadyClosed,

    /// The window is not open.
    #[error("window not open")]
    NotOpen,

    /// The native window resource could not be created.
    #[error("window creation failed: {0}")]
    CreationFailed(String),

    /// A bounded wait on a window thread expired.
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },

    /// An action marshaled onto the window thread panicked.
    #[error("invoked action panicked: {0}")]
    ActionPanicked(String),
}

/// Result type for window operations.
pub type Result<T> = std::result::Result<T, WindowError>;
