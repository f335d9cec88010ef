//! Error types for plugin bindings and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by a plugin's editor binding.
#[derive(Debug, Error)]
pub enum BindingError {
    /// The plugin could not create or attach its editor view.
    #[error("editor view creation failed: {0}")]
    ViewCreation(String),

    /// The plugin does not support the requested operation on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A plugin call returned a failure code.
    #[error("plugin call {operation} failed with code {code}")]
    Plugin { operation: &'static str, code: i32 },

    /// Plugin code panicked.
    #[error("plugin code panicked: {0}")]
    Panicked(String),
}

/// Result type for binding calls.
pub type BindingResult<T> = std::result::Result<T, BindingError>;

/// Errors that can occur while loading an [`EditorConfig`](crate::EditorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse editor config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid editor config: {0}")]
    Invalid(String),
}
