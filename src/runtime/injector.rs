//! The cross-thread wake channel (the loop's reactor).
//!
//! Worker threads and cross-thread cells cannot touch network-thread
//! state; the only thing they may do is push a task id here and kick the
//! condvar. The loop drains the queue at the top of every turn and parks
//! on the condvar when idle.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::task::Wake;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct Injector {
    queue: Mutex<Vec<u64>>,
    condvar: Condvar,
}

impl Injector {
    pub(crate) fn push(&self, task: u64) {
        self.queue.lock().push(task);
        self.condvar.notify_one();
    }

    pub(crate) fn drain(&self) -> Vec<u64> {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Blocks until a wake arrives or `timeout` elapses. Returns
    /// immediately if wakes are already queued.
    pub(crate) fn park(&self, timeout: Option<Duration>) {
        let mut queue = self.queue.lock();
        if !queue.is_empty() {
            return;
        }
        match timeout {
            Some(t) => {
                self.condvar.wait_for(&mut queue, t);
            }
            None => self.condvar.wait(&mut queue),
        }
    }
}

/// Wakes a task by routing its id through the injector. Safe to invoke
/// from any thread.
pub(crate) struct WakeHandle {
    pub(crate) task: u64,
    pub(crate) injector: Arc<Injector>,
}

impl Wake for WakeHandle {
    fn wake(self: Arc<Self>) {
        self.injector.push(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.injector.push(self.task);
    }
}
