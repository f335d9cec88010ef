//! Panic containment for calls into plugin code.

use std::panic::{catch_unwind, AssertUnwindSafe};

use berth_core::{BindingError, BindingResult};
use berth_window::panic_message;

/// Call into the binding, turning a panic into [`BindingError::Panicked`].
pub(crate) fn guarded<R>(call: impl FnOnce() -> BindingResult<R>) -> BindingResult<R> {
    catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(BindingError::Panicked(panic_message(&*payload))))
}

/// Like [`guarded`] for calls that cannot fail; a panic yields `None`.
pub(crate) fn guarded_query<R>(name: &str, call: impl FnOnce() -> Option<R>) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(value) => value,
        Err(payload) => {
            log::error!("{name} panicked: {}", panic_message(&*payload));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_converts_panic() {
        let err = guarded::<()>(|| panic!("plugin fault")).unwrap_err();
        assert!(matches!(err, BindingError::Panicked(msg) if msg == "plugin fault"));
        assert_eq!(guarded(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn test_guarded_query_panic_is_none() {
        assert_eq!(guarded_query::<u32>("size", || panic!("nope")), None);
        assert_eq!(guarded_query("size", || Some(1)), Some(1));
    }
}
