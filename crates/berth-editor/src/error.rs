//! Error types for editor sessions.

use berth_window::WindowError;
use thiserror::Error;

/// Errors returned by [`EditorController`](crate::EditorController).
#[derive(Debug, Error)]
pub enum EditorError {
    /// The host window could not be created or opened.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// The plugin refused or failed to attach its editor view.
    #[error("editor view failed to attach: {0}")]
    AttachFailed(String),

    /// Another open or close of the same editor is in progress.
    #[error("editor is busy opening or closing")]
    Busy,
}

/// Result type for editor operations.
pub type Result<T> = std::result::Result<T, EditorError>;
