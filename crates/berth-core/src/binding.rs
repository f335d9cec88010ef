//! The capability set a plugin exposes for its editor.

use crate::error::BindingResult;
use crate::types::{EditorSize, NativeHandle};

/// Editor-side view of a loaded plugin.
///
/// The controller drives an implementation through one open/close session at
/// a time. Calls that touch the editor view (`create_editor_view`,
/// `close_editor_view`, `resize_editor_view`, `process_idle`) are made on the
/// thread that owns the host window; the remaining calls may come from any
/// thread.
pub trait EditorBinding: Send + Sync {
    /// Create the plugin's editor view inside `parent`.
    ///
    /// Returns `Ok(false)` if the plugin declined to attach.
    fn create_editor_view(&self, parent: NativeHandle) -> BindingResult<bool>;

    /// Detach and destroy the editor view.
    fn close_editor_view(&self) -> BindingResult<()>;

    /// Tell the editor view that its host window changed size.
    fn resize_editor_view(&self, size: EditorSize) -> BindingResult<()>;

    /// The size the editor would like to open at, if it has one.
    fn get_preferred_editor_size(&self) -> Option<EditorSize>;

    /// Periodic idle processing for the editor view.
    fn process_idle(&self) -> BindingResult<()>;

    /// Display name of the plugin, used for default window titles.
    fn plugin_display_name(&self) -> Option<String> {
        None
    }

    /// Take a size the plugin asked the host to resize to, if any.
    ///
    /// Polled after every idle tick. Bindings whose plugins never request a
    /// resize keep the default.
    fn take_resize_request(&self) -> Option<EditorSize> {
        None
    }
}
