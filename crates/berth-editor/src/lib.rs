//! Editor sessions for plugin views in native host windows.
//!
//! [`EditorController`] opens a window from a
//! [`WindowFactory`](berth_window::WindowFactory), attaches the plugin's
//! editor view to it, keeps the view fed with idle calls through an
//! [`IdleDriver`], and tears all of it down again in a fixed order.

mod controller;
mod error;
mod guard;
pub mod idle;

#[cfg(test)]
mod test_support;

pub use controller::{EditorController, EditorState};
pub use error::{EditorError, Result};
pub use idle::IdleDriver;
