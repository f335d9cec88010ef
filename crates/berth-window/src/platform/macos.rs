//! Cocoa window engine.
//!
//! AppKit objects may only be touched on the main thread, so every window
//! operation is funneled there. Synchronous work goes through
//! `dispatch_sync_f` on the main queue. Asynchronous work is a one-shot
//! `CFRunLoopTimer` in the common modes, which keeps firing while a plugin's
//! popup menu holds the run loop in its tracking mode.

use std::ffi::{c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use berth_core::{EditorConfig, EditorSize, NativeHandle};
use objc2::runtime::{AnyClass, AnyObject, ClassBuilder, Sel};
use objc2::{msg_send, sel, ClassType, MainThreadMarker};
use objc2_app_kit::{NSBackingStoreType, NSWindowStyleMask};
use objc2_foundation::{NSObject, NSPoint, NSRect, NSSize, NSString};
use parking_lot::Mutex;

use crate::error::{Result, WindowError};
use crate::events::WindowEvents;
use crate::window::{panic_message, Lifecycle, NativeWindow, Task};

// ---------------------------------------------------------------------------
// libdispatch / CoreFoundation FFI
// ---------------------------------------------------------------------------

#[repr(C)]
struct DispatchQueue {
    _private: [u8; 0],
}

extern "C" {
    static _dispatch_main_q: DispatchQueue;
    fn dispatch_sync_f(
        queue: *const DispatchQueue,
        context: *mut c_void,
        work: extern "C" fn(*mut c_void),
    );
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRunLoopGetMain() -> *mut c_void;
    fn CFRunLoopAddTimer(rl: *mut c_void, timer: *mut c_void, mode: *const c_void);
    fn CFRunLoopTimerCreate(
        allocator: *const c_void,
        fire_date: f64,
        interval: f64,
        flags: u64,
        order: i64,
        callout: extern "C" fn(*mut c_void, *mut c_void),
        context: *mut CFRunLoopTimerContext,
    ) -> *mut c_void;
    fn CFRunLoopRunInMode(mode: *const c_void, seconds: f64, return_after_source_handled: u8) -> i32;
    fn CFAbsoluteTimeGetCurrent() -> f64;
    fn CFRelease(cf: *const c_void);

    static kCFRunLoopCommonModes: *const c_void;
    static kCFRunLoopDefaultMode: *const c_void;
}

#[repr(C)]
struct CFRunLoopTimerContext {
    version: i64,
    info: *mut c_void,
    retain: *const c_void,
    release: *const c_void,
    copy_description: *const c_void,
}

/// Run `f` on the main thread and wait for it.
///
/// Inline when already on the main thread. A panic in `f` is returned as
/// [`WindowError::ActionPanicked`].
fn run_on_main<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    if MainThreadMarker::new().is_some() {
        return catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| WindowError::ActionPanicked(panic_message(&*payload)));
    }

    struct Context<F, R> {
        f: Option<F>,
        result: Option<std::thread::Result<R>>,
    }

    extern "C" fn trampoline<F: FnOnce() -> R, R>(context: *mut c_void) {
        // SAFETY: context points at the Context on the caller's stack, which
        // stays alive until dispatch_sync_f returns.
        let context = unsafe { &mut *(context as *mut Context<F, R>) };
        if let Some(f) = context.f.take() {
            context.result = Some(catch_unwind(AssertUnwindSafe(f)));
        }
    }

    let mut context = Context {
        f: Some(f),
        result: None,
    };
    // SAFETY: the main queue is a process-wide static; dispatch_sync_f
    // blocks until the trampoline has run, so the context pointer is valid.
    unsafe {
        dispatch_sync_f(
            ptr::addr_of!(_dispatch_main_q),
            &mut context as *mut Context<F, R> as *mut c_void,
            trampoline::<F, R>,
        );
    }

    match context.result {
        Some(Ok(value)) => Ok(value),
        Some(Err(payload)) => Err(WindowError::ActionPanicked(panic_message(&*payload))),
        None => Err(WindowError::NotOpen),
    }
}

extern "C" fn run_scheduled_task(_timer: *mut c_void, info: *mut c_void) {
    // SAFETY: info is the Box<Task> leaked in schedule_on_main. The timer
    // does not repeat, so this runs at most once.
    let task = unsafe { Box::from_raw(info as *mut Task) };
    if let Err(payload) = catch_unwind(AssertUnwindSafe(*task)) {
        log::error!("Scheduled main-thread action panicked: {}", panic_message(&*payload));
    }
}

/// Queue `task` on the main run loop in the common modes.
fn schedule_on_main(task: Task) -> Result<()> {
    let info = Box::into_raw(Box::new(task)) as *mut c_void;
    let mut context = CFRunLoopTimerContext {
        version: 0,
        info,
        retain: ptr::null(),
        release: ptr::null(),
        copy_description: ptr::null(),
    };

    // SAFETY: a one-shot timer (interval 0) due now; the context is copied
    // by CFRunLoopTimerCreate.
    let timer = unsafe {
        CFRunLoopTimerCreate(
            ptr::null(),
            CFAbsoluteTimeGetCurrent(),
            0.0,
            0,
            0,
            run_scheduled_task,
            &mut context,
        )
    };
    if timer.is_null() {
        // SAFETY: the timer was not created, so nothing else owns `info`.
        drop(unsafe { Box::from_raw(info as *mut Task) });
        return Err(WindowError::CreationFailed("CFRunLoopTimerCreate failed".into()));
    }

    // SAFETY: the main run loop retains the timer, so our +1 can be released.
    unsafe {
        CFRunLoopAddTimer(CFRunLoopGetMain(), timer, kCFRunLoopCommonModes);
        CFRelease(timer);
    }
    Ok(())
}

/// Run the main run loop in its default mode for `duration`.
pub(crate) fn run_main_loop_for(duration: std::time::Duration) {
    // SAFETY: runs the current thread's run loop; no pointers are retained.
    unsafe {
        CFRunLoopRunInMode(kCFRunLoopDefaultMode, duration.as_secs_f64(), 0);
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct State {
    lifecycle: Lifecycle,
    closing: bool,
    window: usize,
    view: usize,
    delegate: usize,
    size: EditorSize,
}

struct Shared {
    events: WindowEvents,
    state: Mutex<State>,
    active: AtomicBool,
}

impl Shared {
    /// Tear the window down. Main thread only.
    ///
    /// `already_closing` is set when AppKit is closing the window itself.
    fn destroy(&self, already_closing: bool) {
        let (window, delegate) = {
            let mut state = self.state.lock();
            if state.lifecycle != Lifecycle::Open || state.closing {
                return;
            }
            state.closing = true;
            (state.window as *mut AnyObject, state.delegate as *mut AnyObject)
        };

        // The window and view are still alive while handlers run.
        self.events.emit_closed();

        {
            let mut state = self.state.lock();
            state.lifecycle = Lifecycle::Closed;
            state.window = 0;
            state.view = 0;
            state.delegate = 0;
        }
        self.active.store(false, Ordering::Release);

        // SAFETY: main thread; window and delegate are the +1 references taken
        // in create_window. Autorelease defers the final release past any
        // AppKit frame that is still using the window.
        unsafe {
            let _: () = msg_send![window, setDelegate: ptr::null::<AnyObject>()];
            if !already_closing {
                let _: () = msg_send![window, orderOut: ptr::null::<AnyObject>()];
                let _: () = msg_send![window, close];
            }
            let _: *mut AnyObject = msg_send![window, autorelease];
            let _: *mut AnyObject = msg_send![delegate, autorelease];
        }
        log::debug!("Cocoa editor window destroyed");
    }

    fn on_resize(&self, size: EditorSize) {
        {
            let mut state = self.state.lock();
            if state.lifecycle != Lifecycle::Open || state.closing {
                return;
            }
            state.size = size;
        }
        self.events.emit_resize(size);
    }
}

// ---------------------------------------------------------------------------
// NSWindow delegate class
// ---------------------------------------------------------------------------

const SHARED_IVAR: &CStr = c"_berthShared";

fn get_or_register_delegate_class() -> Result<&'static AnyClass> {
    let c_name = c"BerthEditorWindowDelegate";

    if let Some(existing) = AnyClass::get(c_name) {
        return Ok(existing);
    }

    let superclass = NSObject::class();
    let Some(mut builder) = ClassBuilder::new(c_name, superclass) else {
        return AnyClass::get(c_name).ok_or_else(|| {
            WindowError::CreationFailed("window delegate class registration failed".into())
        });
    };

    builder.add_ivar::<*const c_void>(SHARED_IVAR);

    type Handler = unsafe extern "C-unwind" fn(*mut AnyObject, Sel, *mut AnyObject);
    // SAFETY: each method matches the NSWindowDelegate `(id, SEL, NSNotification*)` signature.
    unsafe {
        builder.add_method::<AnyObject, _>(sel!(windowDidResize:), window_did_resize as Handler);
        builder.add_method::<AnyObject, _>(sel!(windowWillClose:), window_will_close as Handler);
        builder.add_method::<AnyObject, _>(sel!(windowDidBecomeKey:), window_did_become_key as Handler);
        builder.add_method::<AnyObject, _>(sel!(windowDidResignKey:), window_did_resign_key as Handler);
    }

    Ok(builder.register())
}

/// The Shared state behind a delegate, if it is still attached.
///
/// # Safety
///
/// `this` must be a BerthEditorWindowDelegate instance.
unsafe fn delegate_shared<'a>(this: *mut AnyObject) -> Option<&'a Shared> {
    // SAFETY: AppKit passes a valid receiver.
    let this: &AnyObject = unsafe { &*this };
    let ivar = this.class().instance_variable(SHARED_IVAR)?;
    // SAFETY: the ivar was written in create_window and is never mutated.
    let ptr = unsafe { *ivar.load_ptr::<*const c_void>(this) } as *const Shared;
    // SAFETY: MacosWindow keeps the Arc<Shared> alive and detaches the
    // delegate before the Arc can drop.
    unsafe { ptr.as_ref() }
}

unsafe extern "C-unwind" fn window_did_resize(this: *mut AnyObject, _cmd: Sel, notification: *mut AnyObject) {
    // SAFETY: called by AppKit on our delegate class.
    let Some(shared) = (unsafe { delegate_shared(this) }) else { return };
    // SAFETY: notification.object is the resized NSWindow.
    let size = unsafe {
        let window: *mut AnyObject = msg_send![notification, object];
        let view: *mut AnyObject = msg_send![window, contentView];
        let frame: NSRect = msg_send![view, frame];
        EditorSize::new(frame.size.width.round() as u32, frame.size.height.round() as u32)
    };
    shared.on_resize(size);
}

unsafe extern "C-unwind" fn window_will_close(this: *mut AnyObject, _cmd: Sel, _notification: *mut AnyObject) {
    // SAFETY: called by AppKit on our delegate class.
    if let Some(shared) = unsafe { delegate_shared(this) } {
        shared.destroy(true);
    }
}

unsafe extern "C-unwind" fn window_did_become_key(this: *mut AnyObject, _cmd: Sel, _notification: *mut AnyObject) {
    // SAFETY: called by AppKit on our delegate class.
    if let Some(shared) = unsafe { delegate_shared(this) } {
        shared.active.store(true, Ordering::Release);
    }
}

unsafe extern "C-unwind" fn window_did_resign_key(this: *mut AnyObject, _cmd: Sel, _notification: *mut AnyObject) {
    // SAFETY: called by AppKit on our delegate class.
    if let Some(shared) = unsafe { delegate_shared(this) } {
        shared.active.store(false, Ordering::Release);
    }
}

/// Create, configure and show the window. Main thread only.
fn create_window(shared: &Arc<Shared>, title: &str, size: EditorSize) -> Result<()> {
    let delegate_class = get_or_register_delegate_class()?;
    let (Some(window_class), Some(view_class), Some(app_class)) = (
        AnyClass::get(c"NSWindow"),
        AnyClass::get(c"NSView"),
        AnyClass::get(c"NSApplication"),
    ) else {
        return Err(WindowError::CreationFailed("AppKit classes unavailable".into()));
    };

    let frame = NSRect::new(
        NSPoint::new(0.0, 0.0),
        NSSize::new(f64::from(size.width), f64::from(size.height)),
    );
    // Titled and resizable, without Closable: no close button.
    let style = NSWindowStyleMask::Titled
        | NSWindowStyleMask::Miniaturizable
        | NSWindowStyleMask::Resizable;

    // SAFETY: main thread (callers go through run_on_main); every object is
    // checked for nil before use.
    unsafe {
        let _app: *mut AnyObject = msg_send![app_class, sharedApplication];

        let window: *mut AnyObject = msg_send![window_class, alloc];
        let window: *mut AnyObject = msg_send![
            window,
            initWithContentRect: frame,
            styleMask: style,
            backing: NSBackingStoreType::Buffered,
            defer: false
        ];
        if window.is_null() {
            return Err(WindowError::CreationFailed("NSWindow init returned nil".into()));
        }

        let view: *mut AnyObject = msg_send![view_class, alloc];
        let view: *mut AnyObject = msg_send![view, initWithFrame: frame];
        if view.is_null() {
            let _: () = msg_send![window, release];
            return Err(WindowError::CreationFailed("NSView init returned nil".into()));
        }

        let delegate: *mut AnyObject = msg_send![delegate_class, alloc];
        let delegate: *mut AnyObject = msg_send![delegate, init];
        if delegate.is_null() {
            let _: () = msg_send![view, release];
            let _: () = msg_send![window, release];
            return Err(WindowError::CreationFailed("window delegate init returned nil".into()));
        }
        if let Some(ivar) = delegate_class.instance_variable(SHARED_IVAR) {
            *ivar.load_ptr::<*const c_void>(&*delegate) = Arc::as_ptr(shared) as *const c_void;
        }

        let ns_title = NSString::from_str(title);
        let _: () = msg_send![window, setReleasedWhenClosed: false];
        let _: () = msg_send![window, setHidesOnDeactivate: false];
        let _: () = msg_send![window, setTitle: &*ns_title];
        let _: () = msg_send![window, setContentView: view];
        // The window now retains the view.
        let _: () = msg_send![view, release];
        let _: () = msg_send![window, setDelegate: delegate];

        let cancelled = {
            let mut state = shared.state.lock();
            if state.lifecycle == Lifecycle::Opening {
                state.lifecycle = Lifecycle::Open;
                state.window = window as usize;
                state.view = view as usize;
                state.delegate = delegate as usize;
                state.size = size;
                false
            } else {
                true
            }
        };
        if cancelled {
            // close() ran while the window was being built; it was never shown.
            let _: () = msg_send![window, setDelegate: ptr::null::<AnyObject>()];
            let _: () = msg_send![window, release];
            let _: () = msg_send![delegate, release];
            return Err(WindowError::AlreadyClosed);
        }

        let _: () = msg_send![window, center];
        let _: () = msg_send![window, makeKeyAndOrderFront: ptr::null::<AnyObject>()];
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// MacosWindow
// ---------------------------------------------------------------------------

/// Native NSWindow with a content NSView, driven from the main thread.
pub struct MacosWindow {
    shared: Arc<Shared>,
}

impl MacosWindow {
    pub fn new(_config: &EditorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                events: WindowEvents::new(),
                state: Mutex::new(State {
                    lifecycle: Lifecycle::Created,
                    closing: false,
                    window: 0,
                    view: 0,
                    delegate: 0,
                    size: EditorSize::new(0, 0),
                }),
                active: AtomicBool::new(false),
            }),
        }
    }
}

impl NativeWindow for MacosWindow {
    fn open(&self, title: &str, size: EditorSize) -> Result<()> {
        if size.is_empty() {
            return Err(WindowError::CreationFailed(format!("invalid size {size}")));
        }
        self.shared.state.lock().lifecycle.begin_open()?;
        let shared = Arc::clone(&self.shared);
        let title = title.to_string();
        match run_on_main(move || create_window(&shared, &title, size)) {
            Ok(Ok(())) => {
                log::debug!("Cocoa editor window opened at {size}");
                Ok(())
            }
            Ok(Err(e)) | Err(e) => {
                self.shared.state.lock().lifecycle.abort_open();
                Err(e)
            }
        }
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            match state.lifecycle {
                // An open() in progress sees this and discards its window.
                Lifecycle::Created | Lifecycle::Opening => {
                    state.lifecycle = Lifecycle::Closed;
                    return;
                }
                Lifecycle::Closed => return,
                Lifecycle::Open => {}
            }
        }
        let shared = Arc::clone(&self.shared);
        if let Err(e) = run_on_main(move || shared.destroy(false)) {
            log::error!("Closing editor window failed: {e}");
        }
    }

    /// The content view, which is what VST3 expects for `kPlatformTypeNSView`.
    fn handle(&self) -> NativeHandle {
        let state = self.shared.state.lock();
        if state.lifecycle == Lifecycle::Open {
            NativeHandle::from_raw(state.view)
        } else {
            NativeHandle::NULL
        }
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
        let shared = Arc::clone(&self.shared);
        run_on_main(move || {
            let window = shared.state.lock().window as *mut AnyObject;
            if window.is_null() {
                return;
            }
            let content = NSSize::new(f64::from(size.width), f64::from(size.height));
            // SAFETY: main thread; the window is alive while state holds it.
            // windowDidResize: follows and reports the new size.
            unsafe {
                let _: () = msg_send![window, setContentSize: content];
            }
        })
    }

    fn invoke(&self, task: Task) -> Result<()> {
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        run_on_main(task)
    }

    fn begin_invoke(&self, task: Task) -> Result<()> {
        if !self.is_open() {
            return Err(WindowError::NotOpen);
        }
        schedule_on_main(task)
    }

    fn events(&self) -> &WindowEvents {
        &self.shared.events
    }
}

impl Drop for MacosWindow {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unopened_window_reports_null() {
        let w = MacosWindow::new(&EditorConfig::default());
        assert!(w.handle().is_null());
        assert!(!w.is_open());
        assert!(matches!(w.begin_invoke(Box::new(|| {})), Err(WindowError::NotOpen)));
        w.close();
        assert!(matches!(
            w.open("x", EditorSize::new(10, 10)),
            Err(WindowError::AlreadyClosed)
        ));
    }

    #[test]
    #[ignore = "needs the main run loop of a GUI process"]
    fn test_open_reports_view_handle() {
        let w = MacosWindow::new(&EditorConfig::default());
        w.open("berth test", EditorSize::new(400, 300)).unwrap();
        assert!(!w.handle().is_null());
        assert_eq!(w.client_size(), Some(EditorSize::new(400, 300)));
        w.close();
        assert!(w.handle().is_null());
    }
}
