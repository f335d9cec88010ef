//! Core abstractions for hosting plugin editors in native windows.
//!
//! This crate has no platform code. It defines the vocabulary shared by the
//! window engines and the editor controller:
//!
//! - [`EditorSize`] and [`NativeHandle`]: what flows between a window and a plugin
//! - [`EditorBinding`]: the capability set a plugin exposes for its editor
//! - [`EditorConfig`]: titles, default sizes and timing knobs

pub mod binding;
pub mod config;
mod error;
pub mod types;

pub use binding::EditorBinding;
pub use config::EditorConfig;
pub use error::{BindingError, BindingResult, ConfigError};
pub use types::{EditorSize, NativeHandle};
