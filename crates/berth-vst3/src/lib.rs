//! VST3 editor binding for Berth.
//!
//! [`Vst3Editor`] drives a plugin's `IPlugView` through the
//! [`EditorBinding`](berth_core::EditorBinding) contract, with a host-side
//! [`HostPlugFrame`] that collects the plugin's resize requests.

mod editor;
mod frame;

pub use editor::Vst3Editor;
pub use frame::HostPlugFrame;
