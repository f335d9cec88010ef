//! Win32 window engine.
//!
//! Every window gets its own thread running a single-threaded COM apartment
//! and a cooperative loop. Each iteration drains the invoke queue, then
//! dispatches at most one OS message, then sleeps until either has work.
//! Queued work therefore never runs inside the window procedure, while
//! sent messages from other threads (a plugin calling back synchronously)
//! still get through.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use berth_core::{EditorConfig, EditorSize, NativeHandle};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_CLASS_ALREADY_EXISTS, HANDLE, HINSTANCE, HWND, LPARAM,
    LRESULT, RECT, WAIT_EVENT, WAIT_IO_COMPLETION, WAIT_OBJECT_0, WAIT_TIMEOUT, WPARAM,
};
use windows::Win32::Graphics::Gdi::{COLOR_WINDOW, HBRUSH};
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{CreateEventW, GetCurrentProcessId, SetEvent, INFINITE};
use windows::Win32::UI::WindowsAndMessaging::{
    AdjustWindowRectEx, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW,
    GetWindowLongPtrW, LoadCursorW, MsgWaitForMultipleObjectsEx, PeekMessageW, PostQuitMessage,
    RegisterClassExW, SetWindowLongPtrW, SetWindowPos, ShowWindow, TranslateMessage,
    CREATESTRUCTW, CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT, GWLP_USERDATA, IDC_ARROW, MSG,
    MWMO_ALERTABLE, MWMO_INPUTAVAILABLE, PM_NOREMOVE, PM_QS_SENDMESSAGE, PM_REMOVE, QS_ALLINPUT,
    QS_SENDMESSAGE, SIZE_MINIMIZED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOZORDER, SW_SHOW,
    WA_INACTIVE, WINDOW_EX_STYLE, WINDOW_STYLE, WM_ACTIVATE, WM_CLOSE, WM_DESTROY, WM_NCCREATE,
    WM_NCDESTROY, WM_QUIT, WM_SIZE, WNDCLASSEXW, WS_CAPTION, WS_CLIPCHILDREN, WS_OVERLAPPED,
    WS_THICKFRAME,
};

use crate::error::{Result, WindowError};
use crate::events::WindowEvents;
use crate::queue::{CondvarSignal, InvokeQueue, Signal};
use crate::thread::{await_startup, startup_channel, WindowThread};
use crate::window::{Lifecycle, NativeWindow, Task};

/// Caption and resizable frame, but no system menu and therefore no close button.
const WINDOW_STYLE_FLAGS: WINDOW_STYLE = WINDOW_STYLE(
    WS_OVERLAPPED.0 | WS_CAPTION.0 | WS_THICKFRAME.0 | WS_CLIPCHILDREN.0,
);

// ---------------------------------------------------------------------------
// Kernel events
// ---------------------------------------------------------------------------

/// An owned Win32 event object.
struct OwnedEvent(HANDLE);

// SAFETY: event handles are process-wide kernel objects; SetEvent and the
// wait functions may be called from any thread.
unsafe impl Send for OwnedEvent {}
// SAFETY: see Send; the handle value itself is never mutated.
unsafe impl Sync for OwnedEvent {}

impl OwnedEvent {
    fn new(manual_reset: bool) -> Result<Self> {
        // SAFETY: no security attributes and no name; the returned handle is owned by Self.
        let handle = unsafe { CreateEventW(None, manual_reset, false, PCWSTR::null()) }
            .map_err(|e| WindowError::CreationFailed(format!("CreateEventW failed: {e}")))?;
        Ok(Self(handle))
    }

    fn set(&self) {
        // SAFETY: self.0 is a live event handle owned by self.
        if let Err(e) = unsafe { SetEvent(self.0) } {
            log::error!("SetEvent failed: {e}");
        }
    }
}

impl Drop for OwnedEvent {
    fn drop(&mut self) {
        // SAFETY: the handle was created by CreateEventW and is closed exactly once.
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// Completion signal whose wait keeps delivering sent messages and APCs.
///
/// A windowing thread that blocks in `invoke` may be the target of a
/// synchronous cross-thread call from the very plugin it is waiting on.
struct AlertableEvent(OwnedEvent);

fn alertable_signal() -> Box<dyn Signal> {
    match OwnedEvent::new(true) {
        Ok(event) => Box::new(AlertableEvent(event)),
        Err(e) => {
            log::warn!("{e}; falling back to a non-alertable wait");
            CondvarSignal::boxed()
        }
    }
}

impl Signal for AlertableEvent {
    fn set(&self) {
        self.0.set();
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let handles = [self.0 .0];
        loop {
            let ms = match deadline {
                None => INFINITE,
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis()
                    .min(u128::from(INFINITE - 1)) as u32,
            };
            // SAFETY: the handle stays valid for the duration of the call.
            let result = unsafe {
                MsgWaitForMultipleObjectsEx(Some(&handles), ms, QS_SENDMESSAGE, MWMO_ALERTABLE)
            };
            if result == WAIT_OBJECT_0 {
                return true;
            }
            if result == WAIT_EVENT(WAIT_OBJECT_0.0 + 1) {
                let mut msg = MSG::default();
                // Peeking with PM_QS_SENDMESSAGE delivers pending sent messages.
                // SAFETY: msg is a valid out pointer.
                let _ = unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE | PM_QS_SENDMESSAGE) };
                continue;
            }
            if result == WAIT_IO_COMPLETION {
                continue;
            }
            if result == WAIT_TIMEOUT {
                return false;
            }
            // SAFETY: reads the calling thread's last-error value.
            let error = unsafe { GetLastError() };
            log::error!("MsgWaitForMultipleObjectsEx failed: {error:?}");
            return false;
        }
    }
}

// ---------------------------------------------------------------------------
// Window class (registered once per process)
// ---------------------------------------------------------------------------

static WINDOW_CLASS: OnceLock<std::result::Result<Vec<u16>, String>> = OnceLock::new();

fn module_instance() -> Result<HINSTANCE> {
    // SAFETY: None requests the handle of the calling process's executable.
    let module = unsafe { GetModuleHandleW(None) }
        .map_err(|e| WindowError::CreationFailed(format!("GetModuleHandleW failed: {e}")))?;
    Ok(module.into())
}

/// Class name for editor windows, registering the class on first use.
///
/// The name carries the process id so hosts that load several copies of
/// this code never collide, and repeated open/close cycles reuse one class.
fn window_class(prefix: &str) -> Result<&'static [u16]> {
    let registered = WINDOW_CLASS.get_or_init(|| register_window_class(prefix));
    match registered {
        Ok(name) => Ok(name.as_slice()),
        Err(e) => Err(WindowError::CreationFailed(e.clone())),
    }
}

fn register_window_class(prefix: &str) -> std::result::Result<Vec<u16>, String> {
    // SAFETY: GetCurrentProcessId has no preconditions.
    let pid = unsafe { GetCurrentProcessId() };
    let name = format!("{prefix}_{pid}");
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let instance = module_instance().map_err(|e| e.to_string())?;

    let class = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wnd_proc),
        hInstance: instance,
        // SAFETY: loading a stock system cursor.
        hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
        hbrBackground: HBRUSH((COLOR_WINDOW.0 + 1) as *mut c_void),
        lpszClassName: PCWSTR(wide.as_ptr()),
        ..Default::default()
    };

    // SAFETY: class is fully initialised and `wide` outlives the call (it is
    // stored in WINDOW_CLASS for the life of the process).
    if unsafe { RegisterClassExW(&class) } == 0 {
        // SAFETY: reads the calling thread's last-error value.
        let error = unsafe { GetLastError() };
        if error != ERROR_CLASS_ALREADY_EXISTS {
            log::error!("RegisterClassExW({name}) failed: {error:?}");
            return Err(format!("RegisterClassExW failed: {error:?}"));
        }
    }
    log::debug!("Registered window class {name}");
    Ok(wide)
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct State {
    lifecycle: Lifecycle,
    handle: NativeHandle,
    size: EditorSize,
}

struct Shared {
    queue: InvokeQueue,
    events: WindowEvents,
    state: Mutex<State>,
    active: AtomicBool,
    wake: Arc<OwnedEvent>,
}

impl Shared {
    fn hwnd(&self) -> Option<HWND> {
        let handle = self.state.lock().handle;
        (!handle.is_null()).then(|| HWND(handle.as_ptr()))
    }

    /// Close notification, then destroy the window if it still exists.
    ///
    /// Must run on the window thread.
    fn request_destroy(&self) {
        self.events.emit_closed();
        // The closed handler may already have destroyed the window.
        if let Some(hwnd) = self.hwnd() {
            // SAFETY: hwnd belongs to this thread and has not been destroyed.
            if let Err(e) = unsafe { DestroyWindow(hwnd) } {
                log::error!("DestroyWindow failed: {e}");
            }
        }
    }

    /// WM_DESTROY: forget the handle and stop accepting work.
    fn on_destroyed(&self) {
        let handle = {
            let mut state = self.state.lock();
            state.lifecycle = Lifecycle::Closed;
            std::mem::replace(&mut state.handle, NativeHandle::NULL)
        };
        self.active.store(false, Ordering::Release);
        // Destroyed without WM_CLOSE (for example by the system at logoff).
        self.events.emit_closed();
        self.queue.close();
        log::debug!("Win32 editor window {handle:?} destroyed");
    }

    fn on_resize(&self, size: EditorSize) {
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

// ---------------------------------------------------------------------------
// Window procedure and thread
// ---------------------------------------------------------------------------

fn loword(value: usize) -> u32 {
    (value & 0xFFFF) as u32
}

fn hiword(value: usize) -> u32 {
    ((value >> 16) & 0xFFFF) as u32
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_NCCREATE {
        // SAFETY: for WM_NCCREATE lparam points to the CREATESTRUCTW of this window.
        let create = unsafe { &*(lparam.0 as *const CREATESTRUCTW) };
        // SAFETY: hwnd is the window being created on this thread.
        unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, create.lpCreateParams as isize) };
        // SAFETY: forwarding the original message arguments.
        return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
    }

    // SAFETY: hwnd is a window of this class on this thread.
    let ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const Shared;
    if ptr.is_null() {
        // SAFETY: forwarding the original message arguments.
        return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
    }
    // SAFETY: the window thread holds an Arc<Shared> for as long as the window
    // exists, and the pointer is cleared on WM_NCDESTROY.
    let shared = unsafe { &*ptr };

    match msg {
        WM_SIZE => {
            if wparam.0 as u32 != SIZE_MINIMIZED {
                let bits = lparam.0 as usize;
                shared.on_resize(EditorSize::new(loword(bits), hiword(bits)));
            }
            LRESULT(0)
        }
        WM_ACTIVATE => {
            shared
                .active
                .store(loword(wparam.0) != WA_INACTIVE, Ordering::Release);
            // SAFETY: forwarding the original message arguments.
            unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
        }
        WM_CLOSE => {
            // No close button, but Alt+F4 and the task bar still send this.
            shared.request_destroy();
            LRESULT(0)
        }
        WM_DESTROY => {
            shared.on_destroyed();
            // SAFETY: ends this thread's message loop.
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        WM_NCDESTROY => {
            // SAFETY: hwnd is still valid during WM_NCDESTROY.
            unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) };
            // SAFETY: forwarding the original message arguments.
            unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
        }
        // SAFETY: forwarding the original message arguments.
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

/// Outer window size for a client area of `size`.
fn frame_size(size: EditorSize) -> Result<(i32, i32)> {
    let mut rect = RECT {
        left: 0,
        top: 0,
        right: size.width as i32,
        bottom: size.height as i32,
    };
    // SAFETY: rect is a valid in/out pointer.
    unsafe { AdjustWindowRectEx(&mut rect, WINDOW_STYLE_FLAGS, false, WINDOW_EX_STYLE(0)) }
        .map_err(|e| WindowError::CreationFailed(format!("AdjustWindowRectEx failed: {e}")))?;
    Ok((rect.right - rect.left, rect.bottom - rect.top))
}

fn create_window(
    shared: &Arc<Shared>,
    class: &'static [u16],
    title: &str,
    size: EditorSize,
) -> Result<HWND> {
    let (width, height) = frame_size(size)?;
    let instance = module_instance()?;
    let title = HSTRING::from(title);

    // SAFETY: the class is registered, and the Shared pointer passed as the
    // creation parameter outlives the window (the thread owns an Arc).
    let hwnd = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            PCWSTR(class.as_ptr()),
            &title,
            WINDOW_STYLE_FLAGS,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            width,
            height,
            None,
            None,
            Some(instance),
            Some(Arc::as_ptr(shared) as *const c_void),
        )
    }
    .map_err(|e| WindowError::CreationFailed(format!("CreateWindowExW failed: {e}")))?;

    // SAFETY: hwnd was just created on this thread.
    let _ = unsafe { ShowWindow(hwnd, SW_SHOW) };
    Ok(hwnd)
}

fn run_loop(shared: &Shared) {
    let mut msg = MSG::default();
    let wake = [shared.wake.0];
    loop {
        shared.queue.drain();

        // SAFETY: msg is a valid out pointer; None covers every window of this thread.
        if unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE) }.as_bool() {
            if msg.message == WM_QUIT {
                break;
            }
            // SAFETY: msg was filled in by PeekMessageW.
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
            continue;
        }

        if shared.queue.is_empty() {
            // SAFETY: the wake event lives as long as `shared`.
            let _ = unsafe {
                MsgWaitForMultipleObjectsEx(
                    Some(&wake),
                    INFINITE,
                    QS_ALLINPUT,
                    MWMO_INPUTAVAILABLE | MWMO_ALERTABLE,
                )
            };
        }
    }
}

fn window_thread_main(
    shared: Arc<Shared>,
    class: &'static [u16],
    title: String,
    size: EditorSize,
    started: Sender<Result<()>>,
) {
    // SAFETY: balanced by CoUninitialize below, on this thread.
    let com = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };
    if com.is_err() {
        log::warn!("CoInitializeEx failed on editor window thread: {com:?}");
    }
    shared.queue.bind_owner();

    match create_window(&shared, class, &title, size) {
        Ok(hwnd) => {
            let abandoned = {
                let mut state = shared.state.lock();
                if state.lifecycle == Lifecycle::Opening {
                    state.lifecycle = Lifecycle::Open;
                    state.handle = NativeHandle::from_ptr(hwnd.0);
                    state.size = size;
                    false
                } else {
                    // open() gave up waiting or close() cancelled it; the
                    // handle is still needed to destroy.
                    state.handle = NativeHandle::from_ptr(hwnd.0);
                    true
                }
            };
            if abandoned {
                log::warn!("Editor window created after open() was abandoned, destroying");
                // SAFETY: hwnd was created on this thread.
                let _ = unsafe { DestroyWindow(hwnd) };
            } else {
                let _ = started.send(Ok(()));
            }
            run_loop(&shared);
        }
        Err(e) => {
            log::error!("{e}");
            let _ = started.send(Err(e));
        }
    }

    shared.queue.close();
    if com.is_ok() {
        // SAFETY: matches the successful CoInitializeEx above.
        unsafe { CoUninitialize() };
    }
}

// ---------------------------------------------------------------------------
// Win32Window
// ---------------------------------------------------------------------------

/// Native window on a dedicated Win32 thread.
pub struct Win32Window {
    shared: Arc<Shared>,
    thread: Mutex<Option<WindowThread>>,
    class_prefix: String,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Win32Window {
    pub fn new(config: &EditorConfig) -> Result<Self> {
        let wake = Arc::new(OwnedEvent::new(false)?);
        let waker = Arc::clone(&wake);
        let shared = Arc::new(Shared {
            queue: InvokeQueue::new(move || waker.set(), alertable_signal),
            events: WindowEvents::new(),
            state: Mutex::new(State {
                lifecycle: Lifecycle::Created,
                handle: NativeHandle::NULL,
                size: EditorSize::new(0, 0),
            }),
            active: AtomicBool::new(false),
            wake,
        });

        Ok(Self {
            shared,
            thread: Mutex::new(None),
            class_prefix: config.window_class_prefix.to_string(),
            startup_timeout: config.window_startup_timeout(),
            shutdown_timeout: config.window_thread_timeout(),
        })
    }

    fn join_thread(&self) {
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if !thread.is_current() {
                thread.join(self.shutdown_timeout);
            }
        }
    }
}

impl NativeWindow for Win32Window {
    fn open(&self, title: &str, size: EditorSize) -> Result<()> {
        if size.is_empty() {
            return Err(WindowError::CreationFailed(format!("invalid size {size}")));
        }
        self.shared.state.lock().lifecycle.begin_open()?;

        let spawned = window_class(&self.class_prefix).and_then(|class| {
            let (started_tx, started_rx) = startup_channel::<()>();
            let shared = Arc::clone(&self.shared);
            let title = title.to_string();
            let thread = WindowThread::spawn("berth-win32-window", move || {
                window_thread_main(shared, class, title, size, started_tx);
            })?;
            Ok((thread, started_rx))
        });
        let (thread, started_rx) = match spawned {
            Ok(spawned) => spawned,
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
        log::debug!("Win32 editor window {:?} opened at {size}", self.handle());
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            match state.lifecycle {
                Lifecycle::Created => {
                    state.lifecycle = Lifecycle::Closed;
                    return;
                }
                Lifecycle::Opening => {
                    // The window thread sees this and destroys what it built;
                    // the pending open() reports the failure.
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
            self.shared.request_destroy();
        } else {
            let shared = Arc::clone(&self.shared);
            // Fails only if the window is already being destroyed.
            let _ = self
                .shared
                .queue
                .begin_invoke(Box::new(move || shared.request_destroy()));
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
        self.is_open() && self.shared.active.load(Ordering::Acquire)
    }

    fn client_size(&self) -> Option<EditorSize> {
        let state = self.shared.state.lock();
        (state.lifecycle == Lifecycle::Open).then_some(state.size)
    }

    fn set_size(&self, size: EditorSize) -> Result<()> {
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        let (width, height) = frame_size(size)?;
        let shared = Arc::clone(&self.shared);
        self.shared.queue.invoke(Box::new(move || {
            let Some(hwnd) = shared.hwnd() else { return };
            // SAFETY: hwnd belongs to this thread; WM_SIZE follows synchronously.
            if let Err(e) = unsafe {
                SetWindowPos(
                    hwnd,
                    None,
                    0,
                    0,
                    width,
                    height,
                    SWP_NOMOVE | SWP_NOZORDER | SWP_NOACTIVATE,
                )
            } {
                log::warn!("SetWindowPos failed: {e}");
            }
        }))
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

impl Drop for Win32Window {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn window() -> Win32Window {
        Win32Window::new(&EditorConfig::default()).unwrap()
    }

    #[test]
    fn test_open_sets_client_size_and_handle() {
        let w = window();
        w.open("berth test", EditorSize::new(400, 300)).unwrap();
        assert!(!w.handle().is_null());
        assert_eq!(w.client_size(), Some(EditorSize::new(400, 300)));
        w.close();
        assert!(w.handle().is_null());
        assert!(!w.is_open());
    }

    #[test]
    fn test_class_reused_across_windows() {
        for _ in 0..3 {
            let w = window();
            w.open("berth test", EditorSize::new(100, 100)).unwrap();
            w.close();
        }
    }

    #[test]
    fn test_invoke_runs_on_window_thread() {
        let w = window();
        w.open("berth test", EditorSize::new(100, 100)).unwrap();
        let caller = std::thread::current().id();
        let on_other = crate::window::invoke_with(&w, move || std::thread::current().id() != caller);
        assert!(on_other.unwrap());
        w.close();
    }

    #[test]
    fn test_wm_close_fires_closed_once() {
        use windows::Win32::UI::WindowsAndMessaging::PostMessageW;

        let w = window();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        w.events().set_closed_handler(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        w.open("berth test", EditorSize::new(100, 100)).unwrap();
        let hwnd = HWND(w.handle().as_ptr());
        // SAFETY: posting to a live window owned by another thread.
        unsafe { PostMessageW(Some(hwnd), WM_CLOSE, WPARAM(0), LPARAM(0)) }.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while w.is_open() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        w.close();
        assert!(!w.is_open());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
