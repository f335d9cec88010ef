//! Periodic idle processing for an attached editor view.
//!
//! A dedicated high-priority thread ticks at the configured rate and queues
//! `process_idle` onto the window's owning thread with `begin_invoke`, so the
//! ticking thread never blocks on plugin code. Ticks coalesce: a new one is
//! not queued while the previous one is still waiting to run.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use berth_core::{EditorBinding, EditorConfig};
use berth_window::NativeWindow;
use crossbeam_channel::{bounded, select, tick, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use thread_priority::ThreadPriority;

use crate::error::{EditorError, Result};
use crate::guard::{guarded, guarded_query};

thread_local! {
    static IN_TICK: Cell<bool> = const { Cell::new(false) };
}

/// State shared between the driver, its thread and queued ticks.
struct Gate {
    /// Held for reading while a tick runs; `stop` takes it for writing to
    /// wait out a tick in flight.
    running: RwLock<()>,
    stopped: AtomicBool,
    /// A tick is queued on the window thread and has not started yet.
    queued: AtomicBool,
    ticks: AtomicU64,
}

/// Drives `process_idle` for one editor session.
pub struct IdleDriver {
    stop_tx: Option<Sender<()>>,
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    gate: Arc<Gate>,
    shutdown_timeout: Duration,
}

impl IdleDriver {
    /// Start ticking for `binding` on `window`'s owning thread.
    pub fn start(
        window: &Arc<dyn NativeWindow>,
        binding: Arc<dyn EditorBinding>,
        config: &EditorConfig,
    ) -> Result<Self> {
        let gate = Arc::new(Gate {
            running: RwLock::new(()),
            stopped: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        });
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let interval = config.idle_interval();
        let window = Arc::downgrade(window);
        let thread_gate = Arc::clone(&gate);

        let handle = thread::Builder::new()
            .name("berth-idle".into())
            .spawn(move || {
                let _exit = exit_tx;
                if thread_priority::set_current_thread_priority(ThreadPriority::Max).is_err() {
                    log::debug!("Idle thread runs at default priority");
                }
                idle_loop(&stop_rx, interval, &window, &binding, &thread_gate);
            })
            .map_err(|e| EditorError::AttachFailed(format!("failed to spawn idle thread: {e}")))?;

        log::debug!("Idle driver started at {}ms per tick", interval.as_millis());
        Ok(Self {
            stop_tx: Some(stop_tx),
            exited: exit_rx,
            handle: Some(handle),
            gate,
            shutdown_timeout: config.idle_shutdown_timeout(),
        })
    }

    /// Number of completed `process_idle` calls.
    pub fn ticks(&self) -> u64 {
        self.gate.ticks.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Stop ticking. Idempotent.
    ///
    /// When this returns, no `process_idle` call is running or will start,
    /// unless a tick in flight overran the shutdown timeout (logged).
    pub fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else { return };
        self.gate.stopped.store(true, Ordering::SeqCst);
        drop(stop_tx);

        // A tick on this very thread already holds the read side.
        if !IN_TICK.with(Cell::get) {
            if self.gate.running.try_write_for(self.shutdown_timeout).is_none() {
                log::warn!(
                    "Idle tick still running after {}ms, continuing teardown",
                    self.shutdown_timeout.as_millis()
                );
            }
        }

        let Some(handle) = self.handle.take() else { return };
        if handle.thread().id() == thread::current().id() {
            // Stopped from a tick that ran inline on the idle thread.
            return;
        }
        match self.exited.recv_timeout(self.shutdown_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Idle thread did not exit within {}ms, detaching",
                    self.shutdown_timeout.as_millis()
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Idle thread panicked");
                }
            }
        }
        log::debug!("Idle driver stopped after {} ticks", self.ticks());
    }
}

impl Drop for IdleDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn idle_loop(
    stop_rx: &Receiver<()>,
    interval: Duration,
    window: &Weak<dyn NativeWindow>,
    binding: &Arc<dyn EditorBinding>,
    gate: &Arc<Gate>,
) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => {
                if gate.stopped.load(Ordering::Acquire) {
                    break;
                }
                if !queue_tick(window, binding, gate) {
                    break;
                }
            }
        }
    }
}

/// Queue one tick. Returns `false` once the window is gone.
fn queue_tick(window: &Weak<dyn NativeWindow>, binding: &Arc<dyn EditorBinding>, gate: &Arc<Gate>) -> bool {
    if gate.queued.swap(true, Ordering::AcqRel) {
        return true;
    }
    let Some(target) = window.upgrade() else {
        return false;
    };
    let task_window = Weak::clone(window);
    let task_binding = Arc::clone(binding);
    let task_gate = Arc::clone(gate);
    let queued = target.begin_invoke(Box::new(move || {
        run_tick(&task_gate, task_binding.as_ref(), &task_window);
    }));
    if let Err(e) = queued {
        gate.queued.store(false, Ordering::Release);
        log::debug!("Idle tick not queued: {e}");
        return target.is_open();
    }
    true
}

/// One tick on the window's owning thread.
fn run_tick(gate: &Gate, binding: &dyn EditorBinding, window: &Weak<dyn NativeWindow>) {
    let _running = gate.running.read();
    gate.queued.store(false, Ordering::Release);
    if gate.stopped.load(Ordering::Acquire) {
        return;
    }

    IN_TICK.with(|t| t.set(true));
    if let Err(e) = guarded(|| binding.process_idle()) {
        log::debug!("process_idle failed: {e}");
    }
    gate.ticks.fetch_add(1, Ordering::AcqRel);

    let request = guarded_query("take_resize_request", || binding.take_resize_request());
    if let (Some(size), Some(window)) = (request, window.upgrade()) {
        if !gate.stopped.load(Ordering::Acquire) {
            log::debug!("Plugin requested editor size {size}");
            if let Err(e) = window.set_size(size) {
                log::warn!("Applying requested editor size {size} failed: {e}");
            }
        }
    }
    IN_TICK.with(|t| t.set(false));
}
