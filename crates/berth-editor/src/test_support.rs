//! Instrumented binding for controller and idle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use berth_core::{BindingResult, EditorBinding, EditorSize, NativeHandle};
use berth_window::NativeWindow;
use parking_lot::Mutex;

#[derive(Default)]
pub(crate) struct StubBinding {
    pub preferred: Option<EditorSize>,
    pub name: Option<String>,
    pub attach_result: Option<bool>,
    pub panic_on_attach: bool,
    pub panic_on_resize: bool,
    pub idle_delay: Option<Duration>,
    pub close_delay: Option<Duration>,
    /// Window whose open state is recorded at each close_editor_view.
    pub watched: Mutex<Option<Arc<dyn NativeWindow>>>,

    pub create_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub idle_calls: AtomicUsize,
    pub attached_handles: Mutex<Vec<NativeHandle>>,
    pub resizes: Mutex<Vec<EditorSize>>,
    pub resize_request: Mutex<Option<EditorSize>>,
    pub idle_threads: Mutex<Vec<ThreadId>>,
    pub window_open_at_close: Mutex<Vec<bool>>,

    pub view_closed: AtomicBool,
    pub in_idle: AtomicBool,
    /// Set if process_idle or resize_editor_view overlapped or followed
    /// close_editor_view.
    pub violation: AtomicBool,
}

impl StubBinding {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            preferred: Some(EditorSize::new(width, height)),
            ..Self::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl EditorBinding for StubBinding {
    fn create_editor_view(&self, parent: NativeHandle) -> BindingResult<bool> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.attached_handles.lock().push(parent);
        if self.panic_on_attach {
            panic!("attach exploded");
        }
        let attached = self.attach_result.unwrap_or(true);
        if attached {
            self.view_closed.store(false, Ordering::SeqCst);
        }
        Ok(attached)
    }

    fn close_editor_view(&self) -> BindingResult<()> {
        if self.in_idle.load(Ordering::SeqCst) {
            self.violation.store(true, Ordering::SeqCst);
        }
        if let Some(window) = self.watched.lock().as_ref() {
            self.window_open_at_close.lock().push(window.is_open());
        }
        if let Some(delay) = self.close_delay {
            thread::sleep(delay);
        }
        self.view_closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resize_editor_view(&self, size: EditorSize) -> BindingResult<()> {
        if self.panic_on_resize {
            panic!("resize exploded");
        }
        if self.view_closed.load(Ordering::SeqCst) {
            self.violation.store(true, Ordering::SeqCst);
        }
        self.resizes.lock().push(size);
        Ok(())
    }

    fn get_preferred_editor_size(&self) -> Option<EditorSize> {
        self.preferred
    }

    fn process_idle(&self) -> BindingResult<()> {
        self.in_idle.store(true, Ordering::SeqCst);
        if self.view_closed.load(Ordering::SeqCst) {
            self.violation.store(true, Ordering::SeqCst);
        }
        self.idle_threads.lock().push(thread::current().id());
        if let Some(delay) = self.idle_delay {
            thread::sleep(delay);
        }
        self.idle_calls.fetch_add(1, Ordering::SeqCst);
        self.in_idle.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn plugin_display_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn take_resize_request(&self) -> Option<EditorSize> {
        self.resize_request.lock().take()
    }
}

/// Poll `done` for up to two seconds.
pub(crate) fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}
