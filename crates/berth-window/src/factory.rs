//! Engine selection.
//!
//! The engine for the running platform is picked once per process. The
//! controller only ever sees `Arc<dyn NativeWindow>`, so tests can swap in
//! a different [`WindowFactory`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use berth_core::EditorConfig;

use crate::error::Result;
use crate::window::NativeWindow;

/// Which window engine backs a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Dedicated thread with its own message pump.
    Win32,
    /// AppKit on the main thread.
    Cocoa,
    /// Direct Xlib connection.
    X11,
    /// Dedicated thread with no OS window.
    Headless,
}

impl EngineKind {
    /// The native engine for this platform, or `None` where there is none.
    pub fn native() -> Option<Self> {
        static NATIVE: OnceLock<Option<EngineKind>> = OnceLock::new();
        *NATIVE.get_or_init(|| {
            let kind = if cfg!(target_os = "windows") {
                Some(Self::Win32)
            } else if cfg!(target_os = "macos") {
                Some(Self::Cocoa)
            } else if cfg!(unix) {
                Some(Self::X11)
            } else {
                None
            };
            log::debug!("Native window engine: {kind:?}");
            kind
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Win32 => "win32",
            Self::Cocoa => "cocoa",
            Self::X11 => "x11",
            Self::Headless => "headless",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Creates unopened windows for editor sessions.
pub trait WindowFactory: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// A fresh window. Each editor session gets its own instance.
    fn create(&self, config: &EditorConfig) -> Result<Arc<dyn NativeWindow>>;
}

/// Factory for the platform's native engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformWindowFactory;

#[cfg(any(target_os = "windows", target_os = "macos", unix))]
impl WindowFactory for PlatformWindowFactory {
    fn kind(&self) -> EngineKind {
        if cfg!(target_os = "windows") {
            EngineKind::Win32
        } else if cfg!(target_os = "macos") {
            EngineKind::Cocoa
        } else {
            EngineKind::X11
        }
    }

    fn create(&self, config: &EditorConfig) -> Result<Arc<dyn NativeWindow>> {
        #[cfg(target_os = "windows")]
        let window = crate::platform::PlatformWindow::new(config)?;
        #[cfg(not(target_os = "windows"))]
        let window = crate::platform::PlatformWindow::new(config);
        Ok(Arc::new(window))
    }
}

#[cfg(not(any(target_os = "windows", target_os = "macos", unix)))]
impl WindowFactory for PlatformWindowFactory {
    fn kind(&self) -> EngineKind {
        EngineKind::Headless
    }

    fn create(&self, _config: &EditorConfig) -> Result<Arc<dyn NativeWindow>> {
        Err(crate::error::WindowError::PlatformNotSupported)
    }
}

/// Factory for [`HeadlessWindow`](crate::platform::headless::HeadlessWindow)s.
#[cfg(feature = "headless")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessWindowFactory;

#[cfg(feature = "headless")]
impl WindowFactory for HeadlessWindowFactory {
    fn kind(&self) -> EngineKind {
        EngineKind::Headless
    }

    fn create(&self, config: &EditorConfig) -> Result<Arc<dyn NativeWindow>> {
        Ok(Arc::new(crate::platform::headless::HeadlessWindow::new(config)))
    }
}

/// The factory for the running platform.
pub fn platform_factory() -> Arc<dyn WindowFactory> {
    Arc::new(PlatformWindowFactory)
}
