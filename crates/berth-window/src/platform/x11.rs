//! X11 window engine over a direct Xlib connection.
//!
//! Each window owns its own display connection. There is no owning thread:
//! marshaled actions run on the caller's thread, serialized by a reentrant
//! lock, after the connection's pending events have been processed. Resize,
//! focus and `WM_DELETE_WINDOW` are therefore observed at the idle cadence.

use std::ffi::{c_int, c_uchar, c_uint, c_ulong, CString};
use std::ptr;
use std::sync::OnceLock;

use berth_core::{EditorConfig, EditorSize, NativeHandle};
use parking_lot::{Mutex, ReentrantMutex};
use x11_dl::xlib;

use crate::error::{Result, WindowError};
use crate::events::WindowEvents;
use crate::window::{run_guarded, Lifecycle, NativeWindow, Task};

// Motif hints: restrict the window manager's functions to everything but close.
const MWM_HINTS_FUNCTIONS: c_ulong = 1 << 0;
const MWM_FUNC_RESIZE: c_ulong = 1 << 1;
const MWM_FUNC_MOVE: c_ulong = 1 << 2;
const MWM_FUNC_MINIMIZE: c_ulong = 1 << 3;
const MWM_FUNC_MAXIMIZE: c_ulong = 1 << 4;

struct XlibLibrary(xlib::Xlib);

// SAFETY: the library is a table of function pointers into libX11, which is
// put into thread-safe mode by XInitThreads before any other call.
unsafe impl Send for XlibLibrary {}
// SAFETY: see above; the table is never mutated after loading.
unsafe impl Sync for XlibLibrary {}

static XLIB: OnceLock<std::result::Result<XlibLibrary, String>> = OnceLock::new();

/// Load libX11 once per process and enable its thread support.
fn xlib() -> Result<&'static xlib::Xlib> {
    let loaded = XLIB.get_or_init(|| {
        let lib = xlib::Xlib::open().map_err(|e| format!("failed to load libX11: {e}"))?;
        // SAFETY: first Xlib call in the process made through this table.
        if unsafe { (lib.XInitThreads)() } == 0 {
            log::warn!("XInitThreads failed; Xlib calls are not thread-safe");
        }
        Ok(XlibLibrary(lib))
    });
    match loaded {
        Ok(lib) => Ok(&lib.0),
        Err(e) => Err(WindowError::CreationFailed(e.clone())),
    }
}

/// Display connection plus the window created on it.
struct Connection {
    display: *mut xlib::Display,
    window: xlib::Window,
    wm_delete: xlib::Atom,
}

// SAFETY: the connection is only used under the engine's state lock, and
// Xlib was initialized for threads.
unsafe impl Send for Connection {}

impl Connection {
    fn open(lib: &xlib::Xlib, title: &str, size: EditorSize) -> Result<Self> {
        // SAFETY: a null name selects $DISPLAY.
        let display = unsafe { (lib.XOpenDisplay)(ptr::null()) };
        if display.is_null() {
            return Err(WindowError::CreationFailed("cannot open X display".into()));
        }

        let title = CString::new(title.replace('\0', " ")).unwrap_or_default();

        // SAFETY: display is a live connection; every id passed below was
        // created on it.
        unsafe {
            let screen = (lib.XDefaultScreen)(display);
            let root = (lib.XRootWindow)(display, screen);
            let window = (lib.XCreateSimpleWindow)(
                display,
                root,
                0,
                0,
                size.width as c_uint,
                size.height as c_uint,
                0,
                (lib.XBlackPixel)(display, screen),
                (lib.XBlackPixel)(display, screen),
            );
            if window == 0 {
                (lib.XCloseDisplay)(display);
                return Err(WindowError::CreationFailed("XCreateSimpleWindow failed".into()));
            }

            (lib.XStoreName)(display, window, title.as_ptr());
            (lib.XSelectInput)(
                display,
                window,
                xlib::StructureNotifyMask | xlib::ExposureMask | xlib::FocusChangeMask,
            );

            let mut wm_delete = (lib.XInternAtom)(display, c"WM_DELETE_WINDOW".as_ptr(), xlib::False);
            (lib.XSetWMProtocols)(display, window, &mut wm_delete, 1);

            let motif = (lib.XInternAtom)(display, c"_MOTIF_WM_HINTS".as_ptr(), xlib::False);
            let hints: [c_ulong; 5] = [
                MWM_HINTS_FUNCTIONS,
                MWM_FUNC_RESIZE | MWM_FUNC_MOVE | MWM_FUNC_MINIMIZE | MWM_FUNC_MAXIMIZE,
                0,
                0,
                0,
            ];
            (lib.XChangeProperty)(
                display,
                window,
                motif,
                motif,
                32,
                xlib::PropModeReplace,
                hints.as_ptr() as *const c_uchar,
                hints.len() as c_int,
            );

            (lib.XMapWindow)(display, window);
            (lib.XFlush)(display);

            Ok(Self {
                display,
                window,
                wm_delete,
            })
        }
    }

    fn destroy(self, lib: &xlib::Xlib) {
        // SAFETY: the window and display are ours and used for the last time.
        unsafe {
            (lib.XDestroyWindow)(self.display, self.window);
            (lib.XFlush)(self.display);
            (lib.XCloseDisplay)(self.display);
        }
    }
}

enum Pending {
    Resized(EditorSize),
    DeleteRequested,
}

struct State {
    lifecycle: Lifecycle,
    closing: bool,
    connection: Option<Connection>,
    size: EditorSize,
    active: bool,
}

/// Top-level X11 window on a private display connection.
pub struct X11Window {
    state: Mutex<State>,
    events: WindowEvents,
    dispatch: ReentrantMutex<()>,
}

impl X11Window {
    pub fn new(_config: &EditorConfig) -> Self {
        Self {
            state: Mutex::new(State {
                lifecycle: Lifecycle::Created,
                closing: false,
                connection: None,
                size: EditorSize::new(0, 0),
                active: false,
            }),
            events: WindowEvents::new(),
            dispatch: ReentrantMutex::new(()),
        }
    }

    /// Drain the connection's event queue and act on what it reported.
    fn pump_events(&self) {
        let Ok(lib) = xlib() else { return };
        let mut pending = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(conn) = state.connection.as_ref() else { return };
            let (display, wm_delete) = (conn.display, conn.wm_delete);
            let mut size = state.size;
            let mut active = state.active;

            // SAFETY: the connection is live while state holds it; XNextEvent
            // only runs when XPending reported a queued event.
            unsafe {
                while (lib.XPending)(display) > 0 {
                    let mut event: xlib::XEvent = std::mem::zeroed();
                    (lib.XNextEvent)(display, &mut event);
                    match event.get_type() {
                        xlib::ConfigureNotify => {
                            let configure = event.configure;
                            let new_size = EditorSize::new(
                                configure.width.max(0) as u32,
                                configure.height.max(0) as u32,
                            );
                            // ConfigureNotify also reports moves.
                            if new_size != size && !new_size.is_empty() {
                                size = new_size;
                                pending.push(Pending::Resized(new_size));
                            }
                        }
                        xlib::FocusIn => active = true,
                        xlib::FocusOut => active = false,
                        xlib::ClientMessage => {
                            let message = event.client_message;
                            if message.data.get_long(0) as xlib::Atom == wm_delete {
                                pending.push(Pending::DeleteRequested);
                            }
                        }
                        _ => {}
                    }
                }
            }
            state.size = size;
            state.active = active;
        }

        for event in pending {
            match event {
                Pending::Resized(size) => {
                    if self.is_open() {
                        self.events.emit_resize(size);
                    }
                }
                Pending::DeleteRequested => {
                    log::debug!("X11 window manager requested close");
                    self.close();
                    break;
                }
            }
        }
    }

    fn run_marshaled(&self, task: Task) -> Result<()> {
        let _serial = self.dispatch.lock();
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        self.pump_events();
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        run_guarded(task)
    }
}

impl NativeWindow for X11Window {
    fn open(&self, title: &str, size: EditorSize) -> Result<()> {
        let mut state = self.state.lock();
        state.lifecycle.check_openable()?;
        if size.is_empty() {
            return Err(WindowError::CreationFailed(format!("invalid size {size}")));
        }
        let connection = Connection::open(xlib()?, title, size)?;
        log::debug!("X11 editor window 0x{:x} opened at {size}", connection.window);
        state.connection = Some(connection);
        state.lifecycle = Lifecycle::Open;
        state.size = size;
        state.active = true;
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            match state.lifecycle {
                // open() holds the state lock for its whole run, so Opening
                // is never seen here.
                Lifecycle::Created | Lifecycle::Opening => {
                    state.lifecycle = Lifecycle::Closed;
                    return;
                }
                Lifecycle::Closed => return,
                Lifecycle::Open if state.closing => return,
                Lifecycle::Open => state.closing = true,
            }
        }

        // The window still exists while handlers run.
        self.events.emit_closed();

        let connection = {
            let mut state = self.state.lock();
            state.lifecycle = Lifecycle::Closed;
            state.active = false;
            state.connection.take()
        };
        if let (Some(connection), Ok(lib)) = (connection, xlib()) {
            connection.destroy(lib);
            log::debug!("X11 editor window destroyed");
        }
    }

    /// The X window id, which is what VST3 expects for `X11EmbedWindowID`.
    fn handle(&self) -> NativeHandle {
        let state = self.state.lock();
        match (&state.connection, state.lifecycle) {
            (Some(conn), Lifecycle::Open) => NativeHandle::from_raw(conn.window as usize),
            _ => NativeHandle::NULL,
        }
    }

    fn is_open(&self) -> bool {
        self.state.lock().lifecycle == Lifecycle::Open
    }

    fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.lifecycle == Lifecycle::Open && state.active
    }

    fn client_size(&self) -> Option<EditorSize> {
        let state = self.state.lock();
        (state.lifecycle == Lifecycle::Open).then_some(state.size)
    }

    /// Resizes the window. The resize notification follows with the
    /// `ConfigureNotify` on the next marshaled call.
    fn set_size(&self, size: EditorSize) -> Result<()> {
        if size.is_empty() {
            return Err(WindowError::CreationFailed(format!("invalid size {size}")));
        }
        let lib = xlib()?;
        let state = self.state.lock();
        let Some(conn) = state.connection.as_ref().filter(|_| state.lifecycle == Lifecycle::Open) else {
            return Err(WindowError::NotOpen);
        };
        // SAFETY: live connection and window, used under the state lock.
        unsafe {
            (lib.XResizeWindow)(conn.display, conn.window, size.width as c_uint, size.height as c_uint);
            (lib.XFlush)(conn.display);
        }
        Ok(())
    }

    fn invoke(&self, task: Task) -> Result<()> {
        self.run_marshaled(task)
    }

    fn begin_invoke(&self, task: Task) -> Result<()> {
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        if let Err(e) = self.run_marshaled(task) {
            log::error!("Window action failed: {e}");
        }
        Ok(())
    }

    fn events(&self) -> &WindowEvents {
        &self.events
    }
}

impl Drop for X11Window {
    fn drop(&mut self) {
        self.close();
    }
}
