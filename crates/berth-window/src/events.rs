//! Resize and close notifications.
//!
//! Handlers are stored behind a lock but always called outside it, so a
//! handler may clear or replace handlers (or close the window) without
//! deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use berth_core::EditorSize;
use parking_lot::Mutex;

use crate::window::panic_message;

type ResizeHandler = Arc<dyn Fn(EditorSize) + Send + Sync>;
type ClosedHandler = Arc<dyn Fn() + Send + Sync>;

/// Per-window notification registry.
#[derive(Default)]
pub struct WindowEvents {
    resize: Mutex<Option<ResizeHandler>>,
    closed: Mutex<Option<ClosedHandler>>,
    closed_fired: AtomicBool,
}

impl WindowEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler called with the new client size after a resize.
    pub fn set_resize_handler(&self, handler: impl Fn(EditorSize) + Send + Sync + 'static) {
        *self.resize.lock() = Some(Arc::new(handler));
    }

    /// Set the handler called once when the window closes.
    pub fn set_closed_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.closed.lock() = Some(Arc::new(handler));
    }

    /// Drop the resize handler only.
    pub fn clear_resize_handler(&self) {
        *self.resize.lock() = None;
    }

    /// Drop all handlers. Notifications after this are ignored.
    pub fn clear_handlers(&self) {
        *self.resize.lock() = None;
        *self.closed.lock() = None;
    }

    /// Deliver a resize notification.
    pub fn emit_resize(&self, size: EditorSize) {
        let handler = self.resize.lock().clone();
        let Some(handler) = handler else { return };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(size))) {
            log::error!("Resize handler panicked: {}", panic_message(&*payload));
        }
    }

    /// Deliver the closed notification if it has not been delivered yet.
    ///
    /// Returns `true` for the call that fired it.
    pub fn emit_closed(&self) -> bool {
        if self.closed_fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let handler = self.closed.lock().clone();
        if let Some(handler) = handler {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler())) {
                log::error!("Closed handler panicked: {}", panic_message(&*payload));
            }
        }
        true
    }

    pub fn closed_fired(&self) -> bool {
        self.closed_fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_closed_fires_once() {
        let events = WindowEvents::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        events.set_closed_handler(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(events.emit_closed());
        assert!(!events.emit_closed());
        assert!(events.closed_fired());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resize_after_clear_is_ignored() {
        let events = WindowEvents::new();
        let last = Arc::new(Mutex::new(None));
        let l = Arc::clone(&last);
        events.set_resize_handler(move |size| *l.lock() = Some(size));

        events.emit_resize(EditorSize::new(10, 20));
        assert_eq!(*last.lock(), Some(EditorSize::new(10, 20)));

        events.clear_handlers();
        events.emit_resize(EditorSize::new(30, 40));
        assert_eq!(*last.lock(), Some(EditorSize::new(10, 20)));
    }

    #[test]
    fn test_clear_resize_keeps_closed_handler() {
        let events = WindowEvents::new();
        let resized = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&resized);
        let c = Arc::clone(&closed);
        events.set_resize_handler(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        events.set_closed_handler(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        events.clear_resize_handler();
        events.emit_resize(EditorSize::new(5, 5));
        assert!(events.emit_closed());
        assert_eq!(resized.load(Ordering::SeqCst), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_clear_handlers() {
        let events = Arc::new(WindowEvents::new());
        let e = Arc::clone(&events);
        events.set_closed_handler(move || e.clear_handlers());
        assert!(events.emit_closed());
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let events = WindowEvents::new();
        events.set_resize_handler(|_| panic!("bad resize"));
        events.emit_resize(EditorSize::new(1, 1));
    }
}
