//! Task storage and resumption.
//!
//! A task is a pinned actor future plus its scheduling metadata. Tasks are
//! resumed synchronously by cell resolution (the network-thread fast
//! path) or asynchronously through the injector (cross-thread wakes).
//! Resuming a task that is already being polled is a fatal invariant
//! violation.

use crate::runtime::injector::{Injector, WakeHandle};
use crate::runtime::queue::Priority;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Identifies a spawned task. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskId(pub(crate) u64);

thread_local! {
    static CURRENT_TASK: Cell<Option<u64>> = const { Cell::new(None) };
}

struct TaskSlot {
    /// Taken out while the task is being polled.
    future: Option<Pin<Box<dyn std::future::Future<Output = ()>>>>,
    waker: Waker,
    priority: Priority,
    running: bool,
    cancelled: bool,
    cancellable: bool,
    /// Set when a cancellation arrives mid-poll; forces one more poll so
    /// the suspension point observes it.
    repoll: bool,
}

pub(crate) struct Executor {
    tasks: RefCell<HashMap<u64, TaskSlot>>,
    next_id: Cell<u64>,
    injector: Arc<Injector>,
}

impl Executor {
    pub(crate) fn new(injector: Arc<Injector>) -> Self {
        Self {
            tasks: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
            injector,
        }
    }

    /// The task currently being polled on this thread, if any.
    pub(crate) fn current_task() -> Option<TaskId> {
        CURRENT_TASK.with(|c| c.get()).map(TaskId)
    }

    pub(crate) fn insert(
        &self,
        future: Pin<Box<dyn std::future::Future<Output = ()>>>,
        cancellable: bool,
        priority: Priority,
    ) -> TaskId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let waker = Waker::from(Arc::new(WakeHandle {
            task: id,
            injector: Arc::clone(&self.injector),
        }));
        self.tasks.borrow_mut().insert(
            id,
            TaskSlot {
                future: Some(future),
                waker,
                priority,
                running: false,
                cancelled: false,
                cancellable,
                repoll: false,
            },
        );
        TaskId(id)
    }

    /// Polls the task to its next suspension point or to completion.
    /// No-op for tasks that no longer exist (stale wakes).
    pub(crate) fn resume(&self, task: TaskId) {
        loop {
            let (mut future, waker) = {
                let mut tasks = self.tasks.borrow_mut();
                let Some(slot) = tasks.get_mut(&task.0) else {
                    return;
                };
                assert!(!slot.running, "ready callback invoked re-entrantly");
                let Some(future) = slot.future.take() else {
                    return;
                };
                slot.running = true;
                (future, slot.waker.clone())
            };

            let previous = CURRENT_TASK.with(|c| c.replace(Some(task.0)));
            let mut cx = Context::from_waker(&waker);
            let result = future.as_mut().poll(&mut cx);
            CURRENT_TASK.with(|c| c.set(previous));

            match result {
                Poll::Ready(()) => {
                    self.tasks.borrow_mut().remove(&task.0);
                    // The future drops here, outside any borrow, so child
                    // cancellations may cascade freely.
                    drop(future);
                    return;
                }
                Poll::Pending => {
                    let again = {
                        let mut tasks = self.tasks.borrow_mut();
                        let Some(slot) = tasks.get_mut(&task.0) else {
                            return;
                        };
                        slot.running = false;
                        slot.future = Some(future);
                        std::mem::take(&mut slot.repoll)
                    };
                    if !again {
                        return;
                    }
                }
            }
        }
    }

    /// Marks the task cancelled and resumes it so the pending suspension
    /// point observes `actor_cancelled`. Ignored for uncancellable tasks.
    pub(crate) fn cancel(&self, task: TaskId) {
        let resume_now = {
            let mut tasks = self.tasks.borrow_mut();
            let Some(slot) = tasks.get_mut(&task.0) else {
                return;
            };
            if !slot.cancellable || slot.cancelled {
                return;
            }
            slot.cancelled = true;
            if slot.running {
                slot.repoll = true;
                false
            } else {
                true
            }
        };
        if resume_now {
            self.resume(task);
        }
    }

    pub(crate) fn is_cancelled(&self, task: TaskId) -> bool {
        self.tasks
            .borrow()
            .get(&task.0)
            .is_some_and(|slot| slot.cancelled)
    }

    pub(crate) fn priority_of(&self, task: TaskId) -> Option<Priority> {
        self.tasks.borrow().get(&task.0).map(|slot| slot.priority)
    }

    pub(crate) fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> Executor {
        Executor::new(Arc::new(Injector::default()))
    }

    #[test]
    fn completed_tasks_are_removed() {
        let ex = executor();
        let task = ex.insert(Box::pin(async {}), true, Priority::DEFAULT_YIELD);
        assert_eq!(ex.task_count(), 1);
        ex.resume(task);
        assert_eq!(ex.task_count(), 0);
    }

    #[test]
    fn stale_resume_is_ignored() {
        let ex = executor();
        let task = ex.insert(Box::pin(async {}), true, Priority::DEFAULT_YIELD);
        ex.resume(task);
        ex.resume(task);
    }

    #[test]
    fn pending_tasks_stay_resident() {
        let ex = executor();
        let task = ex.insert(
            Box::pin(std::future::pending::<()>()),
            true,
            Priority::DEFAULT_YIELD,
        );
        ex.resume(task);
        assert_eq!(ex.task_count(), 1);
        assert_eq!(ex.priority_of(task), Some(Priority::DEFAULT_YIELD));
    }

    #[test]
    fn cancel_marks_and_resumes() {
        let ex = executor();
        let task = ex.insert(
            Box::pin(std::future::pending::<()>()),
            true,
            Priority::DEFAULT_YIELD,
        );
        ex.resume(task);
        ex.cancel(task);
        assert!(ex.is_cancelled(task));
    }

    #[test]
    fn uncancellable_tasks_ignore_cancel() {
        let ex = executor();
        let task = ex.insert(
            Box::pin(std::future::pending::<()>()),
            false,
            Priority::DEFAULT_YIELD,
        );
        ex.resume(task);
        ex.cancel(task);
        assert!(!ex.is_cancelled(task));
    }
}
