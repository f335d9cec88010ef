//! Work queue for a window that owns a dedicated thread.
//!
//! Any thread may enqueue. Only the owning thread drains, from its loop body
//! and never from inside a window procedure. Items run in FIFO order. A
//! synchronous caller waits on a [`Signal`]; the engine decides what kind of
//! wait that is (an alertable one on Win32).

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, WindowError};
use crate::window::{run_guarded, Task};

// ---------------------------------------------------------------------------
// Completion signals
// ---------------------------------------------------------------------------

/// Two-state wait primitive used to hand a result back to a blocked caller.
pub trait Signal: Send + Sync {
    fn set(&self);

    /// Block until set. Returns `false` if `timeout` expired first.
    fn wait(&self, timeout: Option<Duration>) -> bool;
}

/// Plain [`Signal`] over a condition variable.
#[derive(Default)]
pub struct CondvarSignal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl CondvarSignal {
    pub fn boxed() -> Box<dyn Signal> {
        Box::new(Self::default())
    }
}

impl Signal for CondvarSignal {
    fn set(&self) {
        *self.set.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut set = self.set.lock();
        match timeout {
            None => {
                while !*set {
                    self.cond.wait(&mut set);
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*set {
                    if self.cond.wait_until(&mut set, deadline).timed_out() {
                        return *set;
                    }
                }
                true
            }
        }
    }
}

struct Completion {
    signal: Box<dyn Signal>,
    outcome: Mutex<Option<Result<()>>>,
}

impl Completion {
    fn finish(&self, outcome: Result<()>) {
        *self.outcome.lock() = Some(outcome);
        self.signal.set();
    }

    fn take(&self) -> Result<()> {
        self.outcome.lock().take().unwrap_or(Err(WindowError::NotOpen))
    }
}

// ---------------------------------------------------------------------------
// InvokeItem
// ---------------------------------------------------------------------------

/// A queued task plus, for synchronous callers, where to report its outcome.
pub struct InvokeItem {
    task: Task,
    completion: Option<Arc<Completion>>,
}

impl InvokeItem {
    fn run(self) {
        let outcome = run_guarded(self.task);
        match self.completion {
            Some(completion) => completion.finish(outcome),
            None => {
                if let Err(e) = outcome {
                    log::error!("Queued window action failed: {e}");
                }
            }
        }
    }

    fn cancel(self) {
        if let Some(completion) = self.completion {
            completion.finish(Err(WindowError::NotOpen));
        }
    }
}

// ---------------------------------------------------------------------------
// InvokeQueue
// ---------------------------------------------------------------------------

struct QueueState {
    items: VecDeque<InvokeItem>,
    closed: bool,
}

/// FIFO of [`InvokeItem`]s drained by one owning thread.
pub struct InvokeQueue {
    state: Mutex<QueueState>,
    owner: OnceLock<ThreadId>,
    wake: Box<dyn Fn() + Send + Sync>,
    new_signal: fn() -> Box<dyn Signal>,
}

impl InvokeQueue {
    /// Create a queue.
    ///
    /// `wake` is called after every enqueue to rouse the owning thread.
    /// `new_signal` builds the wait primitive for each synchronous call.
    pub fn new(wake: impl Fn() + Send + Sync + 'static, new_signal: fn() -> Box<dyn Signal>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            owner: OnceLock::new(),
            wake: Box::new(wake),
            new_signal,
        }
    }

    /// Mark the calling thread as the owner. Only the first call has an effect.
    pub fn bind_owner(&self) {
        let _ = self.owner.set(thread::current().id());
    }

    pub fn is_owner(&self) -> bool {
        self.owner.get() == Some(&thread::current().id())
    }

    /// Run `task` on the owning thread and wait for its outcome.
    ///
    /// On the owning thread the task runs inline. Elsewhere the caller blocks
    /// until the task ran or the queue was closed underneath it.
    pub fn invoke(&self, task: Task) -> Result<()> {
        if self.is_owner() {
            return run_guarded(task);
        }

        let completion = Arc::new(Completion {
            signal: (self.new_signal)(),
            outcome: Mutex::new(None),
        });
        self.push(InvokeItem {
            task,
            completion: Some(Arc::clone(&completion)),
        })?;
        completion.signal.wait(None);
        completion.take()
    }

    /// Queue `task` without waiting.
    pub fn begin_invoke(&self, task: Task) -> Result<()> {
        self.push(InvokeItem {
            task,
            completion: None,
        })
    }

    fn push(&self, item: InvokeItem) -> Result<()> {
        {
            let mut state = self.state.lock();
            // Nothing would ever drain before an owner exists.
            if state.closed || self.owner.get().is_none() {
                return Err(WindowError::NotOpen);
            }
            state.items.push_back(item);
        }
        (self.wake)();
        Ok(())
    }

    /// Run the items that were queued when the call started.
    ///
    /// Items queued while draining wait for the next call, so a task that
    /// requeues itself cannot starve the message pump. Returns the number of
    /// items run.
    pub fn drain(&self) -> usize {
        let batch = self.state.lock().items.len();
        let mut ran = 0;
        while ran < batch {
            let item = self.state.lock().items.pop_front();
            let Some(item) = item else { break };
            item.run();
            ran += 1;
        }
        ran
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Refuse new items and fail the pending ones so no caller waits forever.
    pub fn close(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        if !pending.is_empty() {
            log::debug!("Dropping {} queued window action(s) on close", pending.len());
        }
        for item in pending {
            item.cancel();
        }
        (self.wake)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::JoinHandle;

    /// Queue plus an owner thread that drains it until closed.
    fn spawn_owner() -> (Arc<InvokeQueue>, JoinHandle<()>) {
        let (tx, rx) = bounded::<()>(1);
        let queue = Arc::new(InvokeQueue::new(
            move || {
                let _ = tx.try_send(());
            },
            CondvarSignal::boxed,
        ));
        let q = Arc::clone(&queue);
        let (bound_tx, bound_rx) = bounded::<()>(0);
        let handle = thread::spawn(move || owner_loop(&q, &rx, &bound_tx));
        bound_rx.recv().unwrap();
        (queue, handle)
    }

    fn owner_loop(queue: &InvokeQueue, wake: &Receiver<()>, bound: &Sender<()>) {
        queue.bind_owner();
        let _ = bound.send(());
        while !queue.is_closed() {
            queue.drain();
            if queue.is_empty() {
                let _ = wake.recv_timeout(Duration::from_millis(5));
            }
        }
    }

    #[test]
    fn test_invoke_waits_for_completion() {
        let (queue, handle) = spawn_owner();
        let done = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&done);
        queue
            .invoke(Box::new(move || {
                thread::sleep(Duration::from_millis(30));
                d.store(true, Ordering::SeqCst);
            }))
            .unwrap();
        assert!(done.load(Ordering::SeqCst));

        queue.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_invoke_runs_inline_on_owner() {
        let (queue, handle) = spawn_owner();
        let q = Arc::clone(&queue);
        let (tx, rx) = bounded(1);
        queue
            .invoke(Box::new(move || {
                let owner = thread::current().id();
                // Would deadlock if it queued instead of running inline.
                let inner = q.invoke(Box::new(move || {
                    let _ = tx.send(thread::current().id() == owner);
                }));
                assert!(inner.is_ok());
            }))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());

        queue.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_invoke_reports_panic() {
        let (queue, handle) = spawn_owner();
        let err = queue.invoke(Box::new(|| panic!("boom"))).unwrap_err();
        assert!(matches!(err, WindowError::ActionPanicked(msg) if msg == "boom"));

        // The owner thread survives and keeps serving.
        assert!(queue.invoke(Box::new(|| {})).is_ok());

        queue.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_fifo_order() {
        let (queue, handle) = spawn_owner();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let o = Arc::clone(&order);
            queue.begin_invoke(Box::new(move || o.lock().push(i))).unwrap();
        }
        queue.invoke(Box::new(|| {})).unwrap();
        assert_eq!(*order.lock(), (0..50).collect::<Vec<_>>());

        queue.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_spawned_owner_accepts_work_immediately() {
        for _ in 0..20 {
            let (queue, handle) = spawn_owner();
            assert!(queue.begin_invoke(Box::new(|| {})).is_ok());
            assert!(queue.invoke(Box::new(|| {})).is_ok());
            queue.close();
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_begin_invoke_panic_is_contained() {
        let (queue, handle) = spawn_owner();
        queue.begin_invoke(Box::new(|| panic!("async boom"))).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        queue
            .invoke(Box::new(move || r.store(true, Ordering::SeqCst)))
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));

        queue.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_close_fails_pending_callers() {
        // The owner exits without draining: the item stays queued until close.
        let queue = Arc::new(InvokeQueue::new(|| {}, CondvarSignal::boxed));
        let q = Arc::clone(&queue);
        thread::spawn(move || q.bind_owner()).join().unwrap();
        assert!(matches!(
            InvokeQueue::new(|| {}, CondvarSignal::boxed).begin_invoke(Box::new(|| {})),
            Err(WindowError::NotOpen)
        ));
        let q = Arc::clone(&queue);
        let caller = thread::spawn(move || q.invoke(Box::new(|| {})));

        let deadline = Instant::now() + Duration::from_secs(2);
        while queue.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        queue.close();

        assert!(matches!(caller.join().unwrap(), Err(WindowError::NotOpen)));
        assert!(matches!(
            queue.begin_invoke(Box::new(|| {})),
            Err(WindowError::NotOpen)
        ));
    }

    #[test]
    fn test_drain_leaves_requeued_items_for_next_pass() {
        let queue = Arc::new(InvokeQueue::new(|| {}, CondvarSignal::boxed));
        queue.bind_owner();
        let q = Arc::clone(&queue);
        queue
            .begin_invoke(Box::new(move || {
                let _ = q.begin_invoke(Box::new(|| {}));
            }))
            .unwrap();

        assert_eq!(queue.drain(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_condvar_signal_timeout() {
        let signal = CondvarSignal::default();
        assert!(!signal.wait(Some(Duration::from_millis(5))));
        signal.set();
        assert!(signal.wait(Some(Duration::from_millis(5))));
        assert!(signal.wait(None));
    }
}
