//! Dedicated-thread window engine without an OS window.
//!
//! Mirrors the threading of the Win32 engine (own thread, [`InvokeQueue`],
//! bounded startup and shutdown) so controller behaviour can be exercised
//! anywhere. The handle is a unique non-null token. External events are
//! simulated from the engine thread with the `simulate_*` methods.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use berth_core::{EditorConfig, EditorSize, NativeHandle};
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;

use crate::error::{Result, WindowError};
use crate::events::WindowEvents;
use crate::queue::{CondvarSignal, InvokeQueue};
use crate::thread::{await_startup, startup_channel, WindowThread};
use crate::window::{Lifecycle, NativeWindow, Task};

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(0x1000);

struct State {
    lifecycle: Lifecycle,
    handle: NativeHandle,
    size: EditorSize,
    active: bool,
    title: String,
}

struct Shared {
    queue: InvokeQueue,
    events: WindowEvents,
    state: Mutex<State>,
}

impl Shared {
    /// Close notification first, then drop the "resource" and stop the loop.
    fn destroy(&self) {
        if self.state.lock().lifecycle != Lifecycle::Open {
            return;
        }
        self.events.emit_closed();
        let handle = {
            let mut state = self.state.lock();
            state.lifecycle = Lifecycle::Closed;
            state.active = false;
            std::mem::replace(&mut state.handle, NativeHandle::NULL)
        };
        self.queue.close();
        if !handle.is_null() {
            log::debug!("Headless window {handle:?} destroyed");
        }
    }

    fn apply_size(&self, size: EditorSize) {
        {
            let mut state = self.state.lock();
            if state.lifecycle != Lifecycle::Open {
                return;
            }
            state.size = size;
        }
        self.events.emit_resize(size);
    }
}

/// Window engine with a real owning thread and no OS resource.
pub struct HeadlessWindow {
    shared: Arc<Shared>,
    thread: Mutex<Option<WindowThread>>,
    wake_rx: Mutex<Option<Receiver<()>>>,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl HeadlessWindow {
    pub fn new(config: &EditorConfig) -> Self {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let queue = InvokeQueue::new(
            move || {
                let _ = wake_tx.try_send(());
            },
            CondvarSignal::boxed,
        );
        let shared = Arc::new(Shared {
            queue,
            events: WindowEvents::new(),
            state: Mutex::new(State {
                lifecycle: Lifecycle::Created,
                handle: NativeHandle::NULL,
                size: EditorSize::new(0, 0),
                active: false,
                title: String::new(),
            }),
        });

        Self {
            shared,
            thread: Mutex::new(None),
            wake_rx: Mutex::new(Some(wake_rx)),
            startup_timeout: config.window_startup_timeout(),
            shutdown_timeout: config.window_thread_timeout(),
        }
    }

    /// Title passed to `open`.
    pub fn title(&self) -> String {
        self.shared.state.lock().title.clone()
    }

    /// Simulate a user resize, delivered from the engine thread.
    pub fn simulate_resize(&self, size: EditorSize) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.shared
            .queue
            .begin_invoke(Box::new(move || shared.apply_size(size)))
    }

    /// Simulate a close initiated by the window system, delivered from the engine thread.
    pub fn simulate_close(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.shared
            .queue
            .begin_invoke(Box::new(move || shared.destroy()))
    }

    /// Simulate focus gain or loss.
    pub fn simulate_focus(&self, active: bool) {
        let mut state = self.shared.state.lock();
        if state.lifecycle == Lifecycle::Open {
            state.active = active;
        }
    }

    fn join_thread(&self) {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread.is_current() {
                // Closed from its own thread: the loop ends after this task.
                return;
            }
            thread.join(self.shutdown_timeout);
        }
    }
}

impl NativeWindow for HeadlessWindow {
    fn open(&self, title: &str, size: EditorSize) -> Result<()> {
        if size.is_empty() {
            return Err(WindowError::CreationFailed(format!("invalid size {size}")));
        }
        self.shared.state.lock().lifecycle.begin_open()?;
        let Some(wake_rx) = self.wake_rx.lock().take() else {
            self.shared.state.lock().lifecycle.abort_open();
            return Err(WindowError::AlreadyClosed);
        };

        let (started_tx, started_rx) = startup_channel::<()>();
        let shared = Arc::clone(&self.shared);
        let title = title.to_string();
        let spawned = WindowThread::spawn("berth-headless-window", move || {
            shared.queue.bind_owner();
            let opened = {
                let mut state = shared.state.lock();
                // close() during open() cancels it.
                if state.lifecycle == Lifecycle::Opening {
                    state.lifecycle = Lifecycle::Open;
                    state.handle = NativeHandle::from_raw(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
                    state.size = size;
                    state.active = true;
                    state.title = title;
                    true
                } else {
                    false
                }
            };
            if !opened {
                shared.queue.close();
                let _ = started_tx.send(Err(WindowError::AlreadyClosed));
                return;
            }
            let _ = started_tx.send(Ok(()));

            while !shared.queue.is_closed() {
                shared.queue.drain();
                if shared.queue.is_empty() && !shared.queue.is_closed() {
                    let _ = wake_rx.recv();
                }
            }
        });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.state.lock().lifecycle.abort_open();
                return Err(e);
            }
        };

        if let Err(e) = await_startup(&started_rx, self.startup_timeout) {
            self.shared.state.lock().lifecycle = Lifecycle::Closed;
            self.shared.queue.close();
            thread.join(self.shutdown_timeout);
            return Err(e);
        }
        *self.thread.lock() = Some(thread);
        log::debug!("Headless window opened at {size}");
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            match state.lifecycle {
                Lifecycle::Created | Lifecycle::Opening => {
                    state.lifecycle = Lifecycle::Closed;
                    return;
                }
                Lifecycle::Closed => {
                    drop(state);
                    self.join_thread();
                    return;
                }
                Lifecycle::Open => {}
            }
        }

        if self.shared.queue.is_owner() {
            self.shared.destroy();
        } else {
            let shared = Arc::clone(&self.shared);
            // Fails only if the loop is already shutting down.
            let _ = self
                .shared
                .queue
                .begin_invoke(Box::new(move || shared.destroy()));
        }
        self.join_thread();
    }

    fn handle(&self) -> NativeHandle {
        self.shared.state.lock().handle
    }

    fn is_open(&self) -> bool {
        self.shared.state.lock().lifecycle == Lifecycle::Open
    }

    fn is_active(&self) -> bool {
        let state = self.shared.state.lock();
        state.lifecycle == Lifecycle::Open && state.active
    }

    fn client_size(&self) -> Option<EditorSize> {
        let state = self.shared.state.lock();
        (state.lifecycle == Lifecycle::Open).then_some(state.size)
    }

    fn set_size(&self, size: EditorSize) -> Result<()> {
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        let shared = Arc::clone(&self.shared);
        self.shared.queue.invoke(Box::new(move || shared.apply_size(size)))
    }

    fn invoke(&self, task: Task) -> Result<()> {
        self.shared.queue.invoke(task)
    }

    fn begin_invoke(&self, task: Task) -> Result<()> {
        self.shared.queue.begin_invoke(task)
    }

    fn events(&self) -> &WindowEvents {
        &self.shared.events
    }
}

impl Drop for HeadlessWindow {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::invoke_with;
    use std::sync::atomic::AtomicBool;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Instant;

    fn window() -> HeadlessWindow {
        HeadlessWindow::new(&EditorConfig::default())
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_open_close_releases_handle() {
        let w = window();
        assert!(w.handle().is_null());
        w.open("Test", EditorSize::new(400, 300)).unwrap();
        assert!(w.is_open());
        assert!(!w.handle().is_null());
        assert_eq!(w.client_size(), Some(EditorSize::new(400, 300)));
        assert_eq!(w.title(), "Test");

        w.close();
        assert!(!w.is_open());
        assert!(w.handle().is_null());
        assert_eq!(w.client_size(), None);
    }

    #[test]
    fn test_open_twice_fails_and_reuse_is_refused() {
        let w = window();
        w.open("A", EditorSize::new(100, 100)).unwrap();
        assert!(matches!(
            w.open("A", EditorSize::new(100, 100)),
            Err(WindowError::AlreadyOpen)
        ));
        w.close();
        assert!(matches!(
            w.open("A", EditorSize::new(100, 100)),
            Err(WindowError::AlreadyClosed)
        ));
    }

    #[test]
    fn test_concurrent_open_starts_one_thread() {
        for _ in 0..20 {
            let w = Arc::new(window());
            let start = Arc::new(Barrier::new(2));
            let openers: Vec<_> = (0..2)
                .map(|_| {
                    let w = Arc::clone(&w);
                    let start = Arc::clone(&start);
                    thread::spawn(move || {
                        start.wait();
                        w.open("A", EditorSize::new(50, 50))
                    })
                })
                .collect();
            let results: Vec<_> = openers.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.iter().any(|r| matches!(r, Err(WindowError::AlreadyOpen))));
            assert!(w.is_open());
            assert!(!w.handle().is_null());
            assert!(w.invoke(Box::new(|| {})).is_ok());
            w.close();
            assert!(w.handle().is_null());
        }
    }

    #[test]
    fn test_close_racing_open_leaves_window_closed() {
        for _ in 0..20 {
            let w = Arc::new(window());
            let opener = {
                let w = Arc::clone(&w);
                thread::spawn(move || w.open("A", EditorSize::new(50, 50)))
            };
            w.close();
            let result = opener.join().unwrap();

            assert!(matches!(result, Ok(()) | Err(WindowError::AlreadyClosed)));
            assert!(wait_until(|| !w.is_open()));
            assert!(matches!(
                w.open("A", EditorSize::new(50, 50)),
                Err(WindowError::AlreadyClosed)
            ));
        }
    }

    #[test]
    fn test_handles_are_unique_across_sessions() {
        let first = window();
        first.open("A", EditorSize::new(10, 10)).unwrap();
        let a = first.handle();
        first.close();

        let second = window();
        second.open("B", EditorSize::new(10, 10)).unwrap();
        assert_ne!(a, second.handle());
    }

    #[test]
    fn test_closed_fires_once() {
        let w = window();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        w.events().set_closed_handler(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        w.open("A", EditorSize::new(10, 10)).unwrap();
        w.close();
        w.close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_simulated_close_runs_on_engine_thread() {
        let w = window();
        let on_engine = Arc::new(AtomicBool::new(false));
        let engine_thread = Arc::new(Mutex::new(None));

        w.open("A", EditorSize::new(10, 10)).unwrap();
        let t = Arc::clone(&engine_thread);
        w.invoke(Box::new(move || *t.lock() = Some(thread::current().id())))
            .unwrap();

        let flag = Arc::clone(&on_engine);
        let t = Arc::clone(&engine_thread);
        w.events().set_closed_handler(move || {
            flag.store(*t.lock() == Some(thread::current().id()), Ordering::SeqCst);
        });
        w.simulate_close().unwrap();

        assert!(wait_until(|| !w.is_open()));
        assert!(on_engine.load(Ordering::SeqCst));
        w.close();
    }

    #[test]
    fn test_resize_notification() {
        let w = window();
        let last = Arc::new(Mutex::new(None));
        let l = Arc::clone(&last);
        w.events().set_resize_handler(move |size| *l.lock() = Some(size));
        w.open("A", EditorSize::new(10, 10)).unwrap();

        w.set_size(EditorSize::new(640, 480)).unwrap();
        assert_eq!(*last.lock(), Some(EditorSize::new(640, 480)));
        assert_eq!(w.client_size(), Some(EditorSize::new(640, 480)));

        w.simulate_resize(EditorSize::new(320, 240)).unwrap();
        assert!(wait_until(|| *last.lock() == Some(EditorSize::new(320, 240))));
        w.close();
    }

    #[test]
    fn test_invoke_after_close_fails() {
        let w = window();
        w.open("A", EditorSize::new(10, 10)).unwrap();
        w.close();
        assert!(matches!(w.invoke(Box::new(|| {})), Err(WindowError::NotOpen)));
        assert!(matches!(w.begin_invoke(Box::new(|| {})), Err(WindowError::NotOpen)));
    }

    #[test]
    fn test_invoke_with_returns_value() {
        let w = window();
        w.open("A", EditorSize::new(10, 10)).unwrap();
        let caller = thread::current().id();
        let ran_elsewhere = invoke_with(&w, move || thread::current().id() != caller).unwrap();
        assert!(ran_elsewhere);
        w.close();
    }

    #[test]
    fn test_focus() {
        let w = window();
        assert!(!w.is_active());
        w.open("A", EditorSize::new(10, 10)).unwrap();
        assert!(w.is_active());
        w.simulate_focus(false);
        assert!(!w.is_active());
        w.close();
        w.simulate_focus(true);
        assert!(!w.is_active());
    }
}
