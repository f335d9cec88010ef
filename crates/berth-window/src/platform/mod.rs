//! Platform window engines.

use std::time::Duration;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(all(unix, not(target_os = "macos")))]
pub mod x11;

#[cfg(feature = "headless")]
pub mod headless;

#[cfg(target_os = "macos")]
pub use macos::MacosWindow as PlatformWindow;

#[cfg(target_os = "windows")]
pub use windows::Win32Window as PlatformWindow;

#[cfg(all(unix, not(target_os = "macos")))]
pub use x11::X11Window as PlatformWindow;

/// Keep the calling thread's event loop serviced for `duration`.
///
/// On macOS this runs the main run loop, which is what lets `invoke` and
/// `begin_invoke` make progress when the caller is the main thread of a
/// process without its own AppKit loop. Other engines own their event
/// handling, so this just sleeps.
pub fn run_event_loop_for(duration: Duration) {
    #[cfg(target_os = "macos")]
    macos::run_main_loop_for(duration);

    #[cfg(not(target_os = "macos"))]
    std::thread::sleep(duration);
}
