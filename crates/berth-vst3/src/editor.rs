//! [`EditorBinding`] over a VST3 `IPlugView`.

use std::ffi::{c_char, CStr};
use std::ptr;
use std::sync::Arc;

use berth_core::{BindingError, BindingResult, EditorBinding, EditorSize, NativeHandle};
use parking_lot::Mutex;
use vst3::Steinberg::Vst::{IEditController, IEditControllerTrait};
use vst3::Steinberg::*;
use vst3::{ComPtr, ComWrapper};

use crate::frame::{rect_size, size_rect, HostPlugFrame, ResizeSlot};

/// The VST3 platform type string for this target's native handle.
fn platform_type() -> Option<FIDString> {
    #[cfg(target_os = "windows")]
    let platform = Some(kPlatformTypeHWND);
    #[cfg(target_os = "macos")]
    let platform = Some(kPlatformTypeNSView);
    #[cfg(all(unix, not(target_os = "macos")))]
    let platform = Some(kPlatformTypeX11EmbedWindowID);
    #[cfg(not(any(unix, target_os = "windows")))]
    let platform = None;
    platform
}

fn check(operation: &'static str, result: tresult) -> BindingResult<()> {
    if result == kResultOk {
        Ok(())
    } else {
        Err(BindingError::Plugin { operation, code: result })
    }
}

struct ViewState {
    view: Option<ComPtr<IPlugView>>,
    frame: Option<ComPtr<IPlugFrame>>,
    attached: bool,
}

/// Editor binding for a VST3 edit controller.
///
/// The `IPlugView` is created on first use and released when the editor
/// closes, so every session starts with a fresh view.
pub struct Vst3Editor {
    controller: Option<ComPtr<IEditController>>,
    state: Mutex<ViewState>,
    requested: ResizeSlot,
    name: Option<String>,
}

// SAFETY: the COM pointers are only used under the state lock, and view
// methods are called on the host window's owning thread by the controller.
unsafe impl Send for Vst3Editor {}
// SAFETY: see above.
unsafe impl Sync for Vst3Editor {}

impl Vst3Editor {
    /// Binding that creates its views from `controller`.
    pub fn new(controller: ComPtr<IEditController>) -> Self {
        Self {
            controller: Some(controller),
            state: Mutex::new(ViewState {
                view: None,
                frame: None,
                attached: false,
            }),
            requested: Arc::default(),
            name: None,
        }
    }

    /// Binding for a single view the host already created.
    ///
    /// Once that view is closed the binding has nothing left to open.
    pub fn from_view(view: ComPtr<IPlugView>) -> Self {
        Self {
            controller: None,
            state: Mutex::new(ViewState {
                view: Some(view),
                frame: None,
                attached: false,
            }),
            requested: Arc::default(),
            name: None,
        }
    }

    /// Plugin name used for the window title.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the view is currently attached to a host window.
    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// The current view, creating it from the controller if needed.
    fn ensure_view(&self, state: &mut ViewState) -> Option<ComPtr<IPlugView>> {
        if state.view.is_none() {
            let controller = self.controller.as_ref()?;
            // SAFETY: "editor" is the standard view type; a null return means
            // the plugin has no editor.
            let raw = unsafe { controller.createView(c"editor".as_ptr()) };
            // SAFETY: createView returns an owned reference or null.
            state.view = unsafe { ComPtr::from_raw(raw) };
            if state.view.is_none() {
                log::warn!("Plugin returned no editor view");
            }
        }
        state.view.clone()
    }
}

impl EditorBinding for Vst3Editor {
    fn create_editor_view(&self, parent: NativeHandle) -> BindingResult<bool> {
        let Some(platform) = platform_type() else {
            return Err(BindingError::Unsupported("no VST3 platform type for this target".into()));
        };
        let mut state = self.state.lock();
        if state.attached {
            return Err(BindingError::ViewCreation("editor view is already attached".into()));
        }
        let view = self
            .ensure_view(&mut state)
            .ok_or_else(|| BindingError::ViewCreation("plugin has no editor view".into()))?;

        // SAFETY: platform is a static null-terminated string.
        let supported = unsafe { view.isPlatformTypeSupported(platform) };
        if supported != kResultTrue {
            // SAFETY: same static string as above.
            let name = unsafe { CStr::from_ptr(platform as *const c_char) }.to_string_lossy();
            return Err(BindingError::Unsupported(format!("view does not support {name}")));
        }

        let frame = ComWrapper::new(HostPlugFrame::new(Arc::clone(&self.requested)))
            .to_com_ptr::<IPlugFrame>()
            .ok_or_else(|| BindingError::ViewCreation("failed to create IPlugFrame".into()))?;

        // SAFETY: frame is a live COM object the view may retain; parent is the
        // open host window's native handle.
        unsafe {
            view.setFrame(frame.as_ptr());
            if view.attached(parent.as_ptr(), platform) != kResultOk {
                view.setFrame(ptr::null_mut());
                log::warn!("Plugin view refused to attach to {parent:?}");
                return Ok(false);
            }
        }

        state.frame = Some(frame);
        state.attached = true;
        log::debug!("VST3 view attached to {parent:?}");
        Ok(true)
    }

    fn close_editor_view(&self) -> BindingResult<()> {
        let mut state = self.state.lock();
        let view = state.view.take();
        let frame = state.frame.take();
        let was_attached = std::mem::replace(&mut state.attached, false);
        drop(state);
        self.requested.lock().take();

        let Some(view) = view else { return Ok(()) };
        let mut result = Ok(());
        if was_attached {
            // SAFETY: the view was attached in create_editor_view.
            result = check("removed", unsafe { view.removed() });
        }
        // SAFETY: detaching the frame before releasing both references.
        unsafe {
            view.setFrame(ptr::null_mut());
        }
        drop(frame);
        drop(view);
        result
    }

    fn resize_editor_view(&self, size: EditorSize) -> BindingResult<()> {
        let state = self.state.lock();
        let Some(view) = state.view.as_ref().filter(|_| state.attached) else {
            return Ok(());
        };
        let mut rect = size_rect(size);
        // SAFETY: rect outlives the call.
        check("onSize", unsafe { view.onSize(&mut rect) })
    }

    fn get_preferred_editor_size(&self) -> Option<EditorSize> {
        let mut state = self.state.lock();
        let view = self.ensure_view(&mut state)?;
        let mut rect = ViewRect {
            left: 0,
            top: 0,
            right: 0,
            bottom: 0,
        };
        // SAFETY: rect outlives the call.
        if unsafe { view.getSize(&mut rect) } != kResultOk {
            return None;
        }
        rect_size(&rect)
    }

    /// VST3 views run on the host's event loop; there is nothing to pump.
    fn process_idle(&self) -> BindingResult<()> {
        Ok(())
    }

    fn plugin_display_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn take_resize_request(&self) -> Option<EditorSize> {
        self.requested.lock().take()
    }
}

impl Drop for Vst3Editor {
    fn drop(&mut self) {
        if self.state.lock().attached {
            log::warn!("Vst3Editor dropped with an attached view, detaching");
        }
        if let Err(e) = self.close_editor_view() {
            log::warn!("Detaching view on drop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicI32, AtomicPtr, AtomicUsize, Ordering};
    use vst3::{Class, ComRef};

    /// Minimal IPlugView that records what the host did to it.
    #[derive(Default)]
    struct FakeView {
        attached: AtomicUsize,
        removed: AtomicUsize,
        width: AtomicI32,
        height: AtomicI32,
        frame: AtomicPtr<IPlugFrame>,
        refuse_attach: bool,
    }

    impl Class for FakeView {
        type Interfaces = (IPlugView,);
    }

    impl IPlugViewTrait for FakeView {
        unsafe fn isPlatformTypeSupported(&self, r#type: FIDString) -> tresult {
            match platform_type() {
                Some(p) if p == r#type => kResultTrue,
                _ => kResultFalse,
            }
        }
        unsafe fn attached(&self, parent: *mut c_void, _type: FIDString) -> tresult {
            if self.refuse_attach || parent.is_null() {
                return kResultFalse;
            }
            self.attached.fetch_add(1, Ordering::SeqCst);
            kResultOk
        }
        unsafe fn removed(&self) -> tresult {
            self.removed.fetch_add(1, Ordering::SeqCst);
            kResultOk
        }
        unsafe fn onWheel(&self, _distance: f32) -> tresult {
            kResultFalse
        }
        unsafe fn onKeyDown(&self, _key: char16, _keyCode: int16, _modifiers: int16) -> tresult {
            kResultFalse
        }
        unsafe fn onKeyUp(&self, _key: char16, _keyCode: int16, _modifiers: int16) -> tresult {
            kResultFalse
        }
        unsafe fn getSize(&self, size: *mut ViewRect) -> tresult {
            // SAFETY: the host passes a valid rect.
            let rect = unsafe { &mut *size };
            rect.left = 0;
            rect.top = 0;
            rect.right = self.width.load(Ordering::SeqCst);
            rect.bottom = self.height.load(Ordering::SeqCst);
            kResultOk
        }
        unsafe fn onSize(&self, newSize: *mut ViewRect) -> tresult {
            // SAFETY: the host passes a valid rect.
            let rect = unsafe { &*newSize };
            self.width.store(rect.right - rect.left, Ordering::SeqCst);
            self.height.store(rect.bottom - rect.top, Ordering::SeqCst);
            kResultOk
        }
        unsafe fn onFocus(&self, _state: TBool) -> tresult {
            kResultOk
        }
        unsafe fn setFrame(&self, frame: *mut IPlugFrame) -> tresult {
            self.frame.store(frame, Ordering::SeqCst);
            kResultOk
        }
        unsafe fn canResize(&self) -> tresult {
            kResultTrue
        }
        unsafe fn checkSizeConstraint(&self, _rect: *mut ViewRect) -> tresult {
            kResultOk
        }
    }

    fn editor_with(view: FakeView) -> (Vst3Editor, ComWrapper<FakeView>) {
        let wrapper = ComWrapper::new(view);
        let ptr = wrapper.to_com_ptr::<IPlugView>().unwrap();
        (Vst3Editor::from_view(ptr), wrapper)
    }

    fn parent() -> NativeHandle {
        NativeHandle::from_raw(0xBEEF)
    }

    #[test]
    fn test_preferred_size_from_view() {
        let view = FakeView::default();
        view.width.store(400, Ordering::SeqCst);
        view.height.store(300, Ordering::SeqCst);
        let (editor, _view) = editor_with(view);
        assert_eq!(editor.get_preferred_editor_size(), Some(EditorSize::new(400, 300)));
    }

    #[test]
    fn test_attach_resize_close() {
        let (editor, view) = editor_with(FakeView::default());
        assert!(editor.create_editor_view(parent()).unwrap());
        assert!(editor.is_attached());
        assert_eq!(view.attached.load(Ordering::SeqCst), 1);
        assert!(!view.frame.load(Ordering::SeqCst).is_null());

        editor.resize_editor_view(EditorSize::new(800, 600)).unwrap();
        assert_eq!(view.width.load(Ordering::SeqCst), 800);
        assert_eq!(view.height.load(Ordering::SeqCst), 600);

        editor.close_editor_view().unwrap();
        assert!(!editor.is_attached());
        assert_eq!(view.removed.load(Ordering::SeqCst), 1);
        assert!(view.frame.load(Ordering::SeqCst).is_null());

        // Nothing left to close or open.
        editor.close_editor_view().unwrap();
        assert_eq!(view.removed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            editor.create_editor_view(parent()),
            Err(BindingError::ViewCreation(_))
        ));
    }

    #[test]
    fn test_refused_attach_returns_false() {
        let (editor, view) = editor_with(FakeView {
            refuse_attach: true,
            ..FakeView::default()
        });
        assert!(!editor.create_editor_view(parent()).unwrap());
        assert!(!editor.is_attached());
        assert!(view.frame.load(Ordering::SeqCst).is_null());
    }

    #[test]
    fn test_resize_request_flows_through_frame() {
        let (editor, view) = editor_with(FakeView::default());
        assert!(editor.create_editor_view(parent()).unwrap());

        let frame = view.frame.load(Ordering::SeqCst);
        // SAFETY: the frame is alive while the view is attached.
        let frame = unsafe { ComRef::<IPlugFrame>::from_raw(frame) }.unwrap();
        let mut rect = ViewRect { left: 0, top: 0, right: 1024, bottom: 512 };
        // SAFETY: rect outlives the call.
        assert_eq!(unsafe { frame.resizeView(ptr::null_mut(), &mut rect) }, kResultOk);

        assert_eq!(editor.take_resize_request(), Some(EditorSize::new(1024, 512)));
        assert_eq!(editor.take_resize_request(), None);
        editor.close_editor_view().unwrap();
    }

    #[test]
    fn test_name_and_idle() {
        let (editor, _view) = editor_with(FakeView::default());
        assert_eq!(editor.plugin_display_name(), None);
        let editor = editor.with_name("Synth");
        assert_eq!(editor.plugin_display_name().as_deref(), Some("Synth"));
        assert!(editor.process_idle().is_ok());
    }
}
