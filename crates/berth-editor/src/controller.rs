//! Editor session state machine.
//!
//! One controller drives one plugin binding through any number of
//! open/close sessions, never two at once. Each session gets a fresh
//! window from the factory. Teardown always runs in the same order,
//! whichever side starts it (a `close_editor` call or the window system):
//! stop idle, drop the resize handler, `close_editor_view`, drop the closed
//! handler, close the window.
//!
//! When the window system closes the window while another thread is already
//! tearing the session down, the closed handler still detaches the view on
//! the window thread before the engine destroys the window.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use berth_core::{BindingResult, EditorBinding, EditorConfig, EditorSize, NativeHandle};
use berth_window::{invoke_with, platform_factory, NativeWindow, WindowFactory};
use parking_lot::{Condvar, Mutex};

use crate::error::{EditorError, Result};
use crate::guard::{guarded, guarded_query};
use crate::idle::IdleDriver;

/// Where an editor is in its session life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorState {
    Closed,
    /// Window creation and view attachment in progress.
    Opening,
    Open,
    /// Teardown in progress.
    Closing,
}

impl fmt::Display for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Per-session state shared with the window's handlers.
struct SessionCore {
    id: u64,
    idle: Mutex<Option<IdleDriver>>,
    view_closed: AtomicBool,
}

impl SessionCore {
    fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            idle: Mutex::new(None),
            view_closed: AtomicBool::new(false),
        })
    }

    fn stop_idle(&self) {
        if let Some(idle) = self.idle.lock().as_mut() {
            idle.stop();
        }
    }

    /// `stop_idle` for the closed handler. A driver that is locked is
    /// already being stopped by the thread running the teardown.
    fn try_stop_idle(&self) {
        if let Some(mut idle) = self.idle.try_lock() {
            if let Some(idle) = idle.as_mut() {
                idle.stop();
            }
        }
    }

    fn is_view_closed(&self) -> bool {
        self.view_closed.load(Ordering::Acquire)
    }

    /// `close_editor_view`, at most once per session.
    fn close_view(&self, binding: &dyn EditorBinding) -> BindingResult<()> {
        if self.view_closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        guarded(|| binding.close_editor_view())
    }
}

struct Session {
    core: Arc<SessionCore>,
    window: Arc<dyn NativeWindow>,
}

struct Slot {
    state: EditorState,
    session: Option<Session>,
    /// Thread running the current teardown.
    closing_on: Option<ThreadId>,
}

struct Inner {
    binding: Arc<dyn EditorBinding>,
    factory: Arc<dyn WindowFactory>,
    config: EditorConfig,
    slot: Mutex<Slot>,
    closed: Condvar,
    next_session: AtomicU64,
}

/// Opens and closes a plugin's editor in a native host window.
pub struct EditorController {
    inner: Arc<Inner>,
}

impl EditorController {
    /// Controller using the platform window engine and default configuration.
    pub fn new(binding: Arc<dyn EditorBinding>) -> Self {
        Self::with_factory(binding, platform_factory(), EditorConfig::default())
    }

    pub fn with_config(binding: Arc<dyn EditorBinding>, config: EditorConfig) -> Self {
        Self::with_factory(binding, platform_factory(), config)
    }

    pub fn with_factory(
        binding: Arc<dyn EditorBinding>,
        factory: Arc<dyn WindowFactory>,
        config: EditorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                binding,
                factory,
                config,
                slot: Mutex::new(Slot {
                    state: EditorState::Closed,
                    session: None,
                    closing_on: None,
                }),
                closed: Condvar::new(),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.inner.config
    }

    /// Open the editor in a new window.
    ///
    /// Does nothing if already open. `title` overrides the default
    /// "`<plugin> - Editor`" title. On failure everything created for the
    /// attempt is torn down again and the editor stays closed.
    pub fn open_editor(&self, title: Option<&str>) -> Result<()> {
        {
            let mut slot = self.inner.slot.lock();
            match slot.state {
                EditorState::Open => return Ok(()),
                EditorState::Opening | EditorState::Closing => return Err(EditorError::Busy),
                EditorState::Closed => slot.state = EditorState::Opening,
            }
        }

        match Inner::open_session(&self.inner, title) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("Failed to open editor: {e}");
                self.inner.slot.lock().state = EditorState::Closed;
                Err(e)
            }
        }
    }

    /// Close the editor. Idempotent.
    ///
    /// If another thread is already closing the editor, waits (bounded) for
    /// that teardown to finish, so the view is detached when this returns.
    /// A call while the editor is still opening is ignored.
    pub fn close_editor(&self) {
        if self.inner.slot.lock().state == EditorState::Opening {
            log::debug!("close_editor ignored while the editor is opening");
            return;
        }
        if !self.inner.teardown(None) {
            self.inner.wait_for_teardown();
        }
    }

    pub fn is_editor_open(&self) -> bool {
        self.inner.slot.lock().state == EditorState::Open
    }

    pub fn state(&self) -> EditorState {
        self.inner.slot.lock().state
    }

    /// Whether the editor window has input focus.
    pub fn is_editor_active(&self) -> bool {
        self.window().is_some_and(|w| w.is_active())
    }

    /// The window of the current session.
    pub fn window(&self) -> Option<Arc<dyn NativeWindow>> {
        let slot = self.inner.slot.lock();
        slot.session.as_ref().map(|s| Arc::clone(&s.window))
    }
}

impl Drop for EditorController {
    fn drop(&mut self) {
        self.close_editor();
    }
}

impl Inner {
    fn open_session(this: &Arc<Self>, title: Option<&str>) -> Result<()> {
        let binding = &this.binding;
        let size = guarded_query("get_preferred_editor_size", || binding.get_preferred_editor_size())
            .filter(|s| !s.is_empty())
            .unwrap_or(this.config.default_size);
        let plugin_name = guarded_query("plugin_display_name", || binding.plugin_display_name());
        let title = this.config.editor_title(title, plugin_name.as_deref());

        let window = this.factory.create(&this.config)?;
        if let Err(e) = window.open(&title, size) {
            window.close();
            return Err(e.into());
        }
        log::info!("Opened editor window \"{title}\" at {size}");

        let handle = window.handle();
        if let Err(e) = Self::attach(this, &window, handle) {
            window.close();
            return Err(e);
        }

        let core = SessionCore::new(this.next_session.fetch_add(1, Ordering::Relaxed));
        Self::install_handlers(this, &window, &core);

        match IdleDriver::start(&window, Arc::clone(&this.binding), &this.config) {
            Ok(idle) => *core.idle.lock() = Some(idle),
            Err(e) => {
                window.events().clear_resize_handler();
                this.close_view(&core, &window);
                window.events().clear_handlers();
                window.close();
                return Err(e);
            }
        }

        let id = core.id;
        let closed_meanwhile = {
            let mut slot = this.slot.lock();
            slot.session = Some(Session {
                core,
                window: Arc::clone(&window),
            });
            slot.state = EditorState::Open;
            window.events().closed_fired() || !window.is_open()
        };

        // The window system closed the window before the handlers saw a session.
        if closed_meanwhile {
            log::debug!("Editor window closed while opening");
            this.teardown(Some(id));
        }
        Ok(())
    }

    fn attach(this: &Arc<Self>, window: &Arc<dyn NativeWindow>, handle: NativeHandle) -> Result<()> {
        if handle.is_null() {
            return Err(EditorError::AttachFailed("window has no native handle".into()));
        }
        let binding = Arc::clone(&this.binding);
        let attached = invoke_with(window.as_ref(), move || {
            guarded(|| binding.create_editor_view(handle))
        })?;
        match attached {
            Ok(true) => {
                log::debug!("Editor view attached to {handle:?}");
                Ok(())
            }
            Ok(false) => Err(EditorError::AttachFailed("plugin declined to create its editor view".into())),
            Err(e) => Err(EditorError::AttachFailed(e.to_string())),
        }
    }

    fn install_handlers(this: &Arc<Self>, window: &Arc<dyn NativeWindow>, core: &Arc<SessionCore>) {
        let binding = Arc::clone(&this.binding);
        let resize_core = Arc::clone(core);
        window.events().set_resize_handler(move |size: EditorSize| {
            if resize_core.is_view_closed() {
                return;
            }
            if let Err(e) = guarded(|| binding.resize_editor_view(size)) {
                log::warn!("resize_editor_view({size}) failed: {e}");
            }
        });

        let weak: Weak<Self> = Arc::downgrade(this);
        let closed_core = Arc::clone(core);
        window.events().set_closed_handler(move || {
            let Some(inner) = weak.upgrade() else { return };
            log::debug!("Editor window closed by the window system");
            if inner.teardown(Some(closed_core.id)) {
                return;
            }
            // Another thread owns the teardown; the window is about to go.
            closed_core.try_stop_idle();
            if let Err(e) = closed_core.close_view(inner.binding.as_ref()) {
                log::warn!("close_editor_view failed: {e}");
            }
        });
    }

    /// Run `close_editor_view` on the window's thread, or here if that
    /// thread is already gone. Runs it at most once per session.
    fn close_view(&self, core: &Arc<SessionCore>, window: &Arc<dyn NativeWindow>) {
        let task_core = Arc::clone(core);
        let binding = Arc::clone(&self.binding);
        let outcome = invoke_with(window.as_ref(), move || task_core.close_view(binding.as_ref()));

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                if !core.is_view_closed() {
                    log::debug!("Window thread unavailable ({e}), closing editor view here");
                }
                core.close_view(self.binding.as_ref())
            }
        };
        if let Err(e) = result {
            log::warn!("close_editor_view failed: {e}");
        }
    }

    /// Tear down the current session. With `only`, only that session.
    ///
    /// Returns `false` if there was nothing to tear down.
    fn teardown(&self, only: Option<u64>) -> bool {
        let session = {
            let mut slot = self.slot.lock();
            let matches = slot
                .session
                .as_ref()
                .is_some_and(|s| only.map_or(true, |id| id == s.core.id));
            if !matches {
                return false;
            }
            slot.state = EditorState::Closing;
            slot.closing_on = Some(thread::current().id());
            slot.session.take()
        };
        let Some(Session { core, window }) = session else { return false };

        core.stop_idle();
        window.events().clear_resize_handler();
        self.close_view(&core, &window);
        window.events().clear_handlers();
        window.close();

        {
            let mut slot = self.slot.lock();
            slot.state = EditorState::Closed;
            slot.closing_on = None;
        }
        self.closed.notify_all();
        log::info!("Editor session {} closed", core.id);
        true
    }

    /// Wait for a teardown running on another thread to finish.
    fn wait_for_teardown(&self) {
        let mut slot = self.slot.lock();
        if slot.state != EditorState::Closing || slot.closing_on == Some(thread::current().id()) {
            return;
        }
        let deadline = Instant::now() + self.teardown_timeout();
        while slot.state == EditorState::Closing {
            if self.closed.wait_until(&mut slot, deadline).timed_out() {
                log::warn!(
                    "Editor teardown still running after {}ms, not waiting any longer",
                    self.teardown_timeout().as_millis()
                );
                return;
            }
        }
    }

    fn teardown_timeout(&self) -> Duration {
        self.config.idle_shutdown_timeout() + self.config.window_thread_timeout()
    }
}
