//! Dedicated window threads: spawn, startup handshake, bounded join.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::{Result, WindowError};

/// A spawned window thread that can be joined with a timeout.
pub(crate) struct WindowThread {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    exited: Receiver<()>,
}

impl WindowThread {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        // The sender is dropped when the thread ends, panicking or not.
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _exit = exit_tx;
                body();
            })
            .map_err(|e| WindowError::CreationFailed(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            handle: Some(handle),
            exited: exit_rx,
        })
    }

    pub(crate) fn is_current(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id())
    }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// Returns `false` (after logging) if it did not. A thread cannot join
    /// itself; in that case the handle is detached and `true` is returned.
    pub(crate) fn join(mut self, timeout: Duration) -> bool {
        if self.is_current() {
            return true;
        }
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} thread did not exit within {}ms, detaching",
                    self.name,
                    timeout.as_millis()
                );
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        log::error!("{} thread panicked", self.name);
                    }
                }
                true
            }
        }
    }
}

/// One-shot channel a window thread uses to report that construction finished.
pub(crate) fn startup_channel<T>() -> (Sender<Result<T>>, Receiver<Result<T>>) {
    bounded(1)
}

/// Wait for a window thread's construction report.
pub(crate) fn await_startup<T>(rx: &Receiver<Result<T>>, timeout: Duration) -> Result<T> {
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(WindowError::Timeout {
            operation: "window startup",
            duration_ms: timeout.as_millis() as u64,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(WindowError::CreationFailed(
            "window thread exited during startup".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_finished_thread() {
        let thread = WindowThread::spawn("test-finish", || {}).unwrap();
        assert!(thread.join(Duration::from_secs(1)));
    }

    #[test]
    fn test_join_times_out() {
        let (tx, rx) = bounded::<()>(0);
        let thread = WindowThread::spawn("test-stuck", move || {
            let _ = rx.recv();
        })
        .unwrap();
        assert!(!thread.join(Duration::from_millis(10)));
        drop(tx);
    }

    #[test]
    fn test_join_panicked_thread() {
        let thread = WindowThread::spawn("test-panic", || panic!("thread boom")).unwrap();
        assert!(thread.join(Duration::from_secs(1)));
    }

    #[test]
    fn test_startup_timeout_and_disconnect() {
        let (tx, rx) = startup_channel::<u32>();
        let err = await_startup(&rx, Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, WindowError::Timeout { operation: "window startup", .. }));

        drop(tx);
        let err = await_startup(&rx, Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, WindowError::CreationFailed(_)));
    }
}
