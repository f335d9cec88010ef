//! The capability set every window engine provides.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use berth_core::{EditorSize, NativeHandle};
use parking_lot::Mutex;

use crate::error::{Result, WindowError};
use crate::events::WindowEvents;

/// A unit of work marshaled onto a window's owning thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A host-owned native window that a plugin editor can be attached to.
///
/// An instance owns at most one native window for its whole life. After
/// `close` it cannot be reopened; create a fresh instance for a new session.
pub trait NativeWindow: Send + Sync {
    /// Create and show a top-level window with the given client size.
    ///
    /// The window has no user-facing close button. Fails with
    /// [`WindowError::AlreadyOpen`] if already open and with
    /// [`WindowError::AlreadyClosed`] if it was closed before.
    fn open(&self, title: &str, size: EditorSize) -> Result<()>;

    /// Destroy the native window. Idempotent.
    ///
    /// The closed notification fires exactly once per instance, whether the
    /// close came from here or from the window system.
    fn close(&self);

    /// Native handle to hand to a plugin, or [`NativeHandle::NULL`] when not open.
    fn handle(&self) -> NativeHandle;

    fn is_open(&self) -> bool;

    /// Whether the window currently has input focus.
    fn is_active(&self) -> bool;

    /// Current client area size, or `None` when not open.
    fn client_size(&self) -> Option<EditorSize>;

    /// Resize the client area. A resize notification follows, as for a user resize.
    fn set_size(&self, size: EditorSize) -> Result<()>;

    /// Run `task` on the window's owning thread and wait for it.
    ///
    /// Runs inline when already on that thread. A panic inside `task` is
    /// returned as [`WindowError::ActionPanicked`].
    fn invoke(&self, task: Task) -> Result<()>;

    /// Queue `task` on the window's owning thread without waiting.
    ///
    /// A panic inside `task` is logged and dropped.
    fn begin_invoke(&self, task: Task) -> Result<()>;

    /// Resize and close notifications.
    fn events(&self) -> &WindowEvents;
}

/// [`NativeWindow::invoke`] for closures that produce a value.
pub fn invoke_with<W, F, R>(window: &W, f: F) -> Result<R>
where
    W: NativeWindow + ?Sized,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let slot = Arc::new(Mutex::new(None));
    let out = Arc::clone(&slot);
    window.invoke(Box::new(move || {
        *out.lock() = Some(f());
    }))?;
    let value = slot.lock().take();
    value.ok_or(WindowError::NotOpen)
}

/// Best-effort text from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a task, turning a panic into [`WindowError::ActionPanicked`].
pub(crate) fn run_guarded(task: Task) -> Result<()> {
    catch_unwind(AssertUnwindSafe(task))
        .map_err(|payload| WindowError::ActionPanicked(panic_message(&*payload)))
}

/// Where a window instance is in its single-use life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    /// `open` is constructing the native window.
    Opening,
    Open,
    Closed,
}

impl Lifecycle {
    pub(crate) fn check_openable(self) -> Result<()> {
        match self {
            Self::Created => Ok(()),
            Self::Opening | Self::Open => Err(WindowError::AlreadyOpen),
            Self::Closed => Err(WindowError::AlreadyClosed),
        }
    }

    /// Claim the single `open` of an instance. Call under the state lock.
    pub(crate) fn begin_open(&mut self) -> Result<()> {
        self.check_openable()?;
        *self = Self::Opening;
        Ok(())
    }

    /// Undo `begin_open` after a failure before any native resource exists.
    pub(crate) fn abort_open(&mut self) {
        if *self == Self::Opening {
            *self = Self::Created;
        }
    }
}
