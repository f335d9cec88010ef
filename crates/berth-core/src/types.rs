//! Plain value types shared between window engines and plugin bindings.

use std::ffi::c_void;
use std::fmt;

use serde::Deserialize;

/// Editor size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct EditorSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl EditorSize {
    /// Create a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for EditorSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

impl fmt::Display for EditorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque, pointer-sized native handle.
///
/// What the value means depends on the platform: an `HWND` on Windows, an
/// `NSView*` on macOS, an X11 window id on Linux. Zero is the null sentinel
/// and is what a closed window reports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Wrap a raw handle value.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Wrap a pointer.
    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }

    /// The raw value.
    pub const fn raw(self) -> usize {
        self.0
    }

    /// The value as a pointer, for passing across an FFI boundary.
    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(NativeHandle::NULL.is_null());
        assert!(NativeHandle::default().is_null());
        assert!(NativeHandle::NULL.as_ptr().is_null());
    }

    #[test]
    fn test_handle_from_ptr() {
        let mut value = 7u32;
        let handle = NativeHandle::from_ptr(&mut value as *mut u32);
        assert!(!handle.is_null());
        assert_eq!(handle.as_ptr() as *mut u32, &mut value as *mut u32);
    }

    #[test]
    fn test_handle_debug_is_hex() {
        assert_eq!(format!("{:?}", NativeHandle::from_raw(0x2a)), "NativeHandle(0x2a)");
    }

    #[test]
    fn test_size_display_and_empty() {
        let size = EditorSize::new(400, 300);
        assert_eq!(size.to_string(), "400x300");
        assert!(!size.is_empty());
        assert!(EditorSize::new(0, 300).is_empty());
        assert_eq!(EditorSize::from((1, 2)), EditorSize::new(1, 2));
    }
}
