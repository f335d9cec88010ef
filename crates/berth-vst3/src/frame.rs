//! Host-side `IPlugFrame`.

use std::sync::Arc;

use berth_core::EditorSize;
use parking_lot::Mutex;
use vst3::Class;
use vst3::Steinberg::*;

/// Latest size the plugin asked for, shared with the editor binding.
pub(crate) type ResizeSlot = Arc<Mutex<Option<EditorSize>>>;

/// `IPlugFrame` handed to the plugin view with `setFrame`.
///
/// `resizeView` only records the request. The host applies it to its window
/// later, and the window's resize notification reaches the view as `onSize`.
pub struct HostPlugFrame {
    requested: ResizeSlot,
}

impl HostPlugFrame {
    pub(crate) fn new(requested: ResizeSlot) -> Self {
        Self { requested }
    }
}

impl Class for HostPlugFrame {
    type Interfaces = (IPlugFrame,);
}

/// Width and height of a view rectangle, if it has an area.
pub(crate) fn rect_size(rect: &ViewRect) -> Option<EditorSize> {
    let width = rect.right.saturating_sub(rect.left);
    let height = rect.bottom.saturating_sub(rect.top);
    (width > 0 && height > 0).then(|| EditorSize::new(width as u32, height as u32))
}

pub(crate) fn size_rect(size: EditorSize) -> ViewRect {
    ViewRect {
        left: 0,
        top: 0,
        right: size.width.min(i32::MAX as u32) as i32,
        bottom: size.height.min(i32::MAX as u32) as i32,
    }
}

impl IPlugFrameTrait for HostPlugFrame {
    unsafe fn resizeView(&self, _view: *mut IPlugView, newSize: *mut ViewRect) -> tresult {
        if newSize.is_null() {
            return kInvalidArgument;
        }
        // SAFETY: newSize is non-null (checked above) and the plugin keeps it
        // valid for the duration of the call.
        let rect = unsafe { &*newSize };
        let Some(size) = rect_size(rect) else {
            return kInvalidArgument;
        };
        log::debug!("Plugin view requested resize to {size}");
        *self.requested.lock() = Some(size);
        kResultOk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vst3::ComWrapper;

    #[test]
    fn test_rect_conversions() {
        let rect = ViewRect { left: 10, top: 20, right: 410, bottom: 320 };
        assert_eq!(rect_size(&rect), Some(EditorSize::new(400, 300)));

        let empty = ViewRect { left: 5, top: 5, right: 5, bottom: 40 };
        assert_eq!(rect_size(&empty), None);

        let rect = size_rect(EditorSize::new(640, 480));
        assert_eq!((rect.left, rect.top, rect.right, rect.bottom), (0, 0, 640, 480));
    }

    #[test]
    fn test_resize_view_records_request() {
        let slot: ResizeSlot = Arc::default();
        let frame = ComWrapper::new(HostPlugFrame::new(Arc::clone(&slot)))
            .to_com_ptr::<IPlugFrame>()
            .unwrap();

        let mut rect = ViewRect { left: 0, top: 0, right: 500, bottom: 250 };
        // SAFETY: rect outlives the call; a null view is accepted.
        let result = unsafe { frame.resizeView(std::ptr::null_mut(), &mut rect) };
        assert_eq!(result, kResultOk);
        assert_eq!(*slot.lock(), Some(EditorSize::new(500, 250)));

        // SAFETY: null size is rejected before any dereference.
        let result = unsafe { frame.resizeView(std::ptr::null_mut(), std::ptr::null_mut()) };
        assert_eq!(result, kInvalidArgument);
    }
}
