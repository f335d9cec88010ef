//! # Berth
//!
//! Native windows for hosting audio plugin editors.
//!
//! Berth gives a plugin's editor view a top-level window of its own and keeps
//! the two in lock-step: the view is attached when the window opens, fed with
//! idle calls while it is shown, and detached before the window goes away,
//! whether the host or the window system closes it.
//!
//! ## Architecture
//!
//! ```text
//! EditorController (session state machine + idle driver)
//!        ↓                          ↓
//! NativeWindow (Win32 / Cocoa / X11) EditorBinding (e.g. Vst3Editor)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use berth::prelude::*;
//!
//! let binding = Arc::new(Vst3Editor::new(edit_controller).with_name("MySynth"));
//! let editor = EditorController::new(binding);
//! editor.open_editor(None)?;
//! // ... later
//! editor.close_editor();
//! ```

pub use berth_core as core;
pub use berth_editor as editor;
pub use berth_window as window;

#[cfg(feature = "vst3")]
pub use berth_vst3 as vst3_impl;

/// Re-export of vst3 types needed to hand an edit controller to [`vst3_impl::Vst3Editor`].
#[cfg(feature = "vst3")]
pub mod vst3 {
    pub use ::vst3::{ComPtr, Steinberg};
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use std::sync::Arc;

    pub use berth_core::{
        BindingError, BindingResult, ConfigError, EditorBinding, EditorConfig, EditorSize,
        NativeHandle,
    };

    pub use berth_editor::{EditorController, EditorError, EditorState};

    pub use berth_window::platform::run_event_loop_for;
    pub use berth_window::{EngineKind, NativeWindow, WindowError, WindowFactory};

    #[cfg(feature = "vst3")]
    pub use berth_vst3::Vst3Editor;
}
