//! Native host windows for plugin editors.
//!
//! A [`NativeWindow`] is a top-level window without a close button plus a
//! way to run code on the thread that owns it. Three engines implement it:
//! a dedicated-thread message pump on Windows, main-thread dispatch on
//! macOS, and a direct Xlib connection on Linux. [`WindowFactory`] picks
//! one per platform.

mod error;
pub mod events;
pub mod factory;
pub mod platform;
pub mod queue;
#[cfg(any(target_os = "windows", feature = "headless"))]
mod thread;
pub mod window;

pub use error::{Result, WindowError};
pub use events::WindowEvents;
pub use factory::{platform_factory, EngineKind, PlatformWindowFactory, WindowFactory};
pub use window::{invoke_with, panic_message, NativeWindow, Task};

#[cfg(feature = "headless")]
pub use factory::HeadlessWindowFactory;
