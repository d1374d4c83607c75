//! The single-assignment cell behind a promise/future pair.
//!
//! A cell is a one-shot mailbox: it transitions exactly once from pending
//! to a value or an error, then fires its callbacks synchronously in
//! insertion order. Reference counts are split into a promise side and a
//! future side; the split is what drives broken-promise detection and
//! cancellation, so the counts are tracked explicitly rather than piggy-
//! backing on `Rc` strong counts.
//!
//! All operations are single-threaded (network thread policy). The
//! cross-thread variant lives in [`crate::threadsafe`].

use crate::error::Error;
use crate::runtime::{self, TaskId};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::task::Waker;

/// A queued reaction to a cell resolving.
pub(crate) enum Callback {
    /// Resume the task that suspended on this cell.
    Resume(TaskId),
    /// Wake a standard waker (used when polled outside a runtime task).
    Wake(Waker),
    /// Invoke a closure; the closure reads the resolved state through a
    /// handle it captured.
    Notify(Box<dyn FnOnce()>),
}

impl Callback {
    pub(crate) fn fire(self) {
        match self {
            Self::Resume(task) => runtime::resume_task(task),
            Self::Wake(waker) => waker.wake(),
            Self::Notify(f) => f(),
        }
    }
}

/// Insertion-ordered callbacks addressed by monotonically increasing ids.
///
/// Ids are never reused within a list's lifetime, so a stale id held by a
/// dropped subscription can never cancel someone else's callback. Lists
/// hold one or two entries in practice, so id lookup is a constant-cost
/// scan of the inline buffer.
#[derive(Default)]
pub(crate) struct CallbackList {
    entries: SmallVec<[(u64, Callback); 2]>,
    next_id: u64,
}

impl CallbackList {
    pub(crate) fn add(&mut self, cb: Callback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, cb));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Callback> {
        let index = self.entries.iter().position(|(i, _)| *i == id)?;
        Some(self.entries.remove(index).1)
    }

    pub(crate) fn replace(&mut self, id: u64, cb: Callback) {
        if let Some(entry) = self.entries.iter_mut().find(|(i, _)| *i == id) {
            entry.1 = cb;
        }
    }

    /// Removes and returns every live callback, oldest first.
    pub(crate) fn take_all(&mut self) -> SmallVec<[(u64, Callback); 2]> {
        std::mem::take(&mut self.entries)
    }

    /// Removes and returns the oldest live callback.
    pub(crate) fn take_first(&mut self) -> Option<Callback> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.entries.remove(0).1)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn live(&self) -> usize {
        self.entries.len()
    }
}

/// Resolution state of a cell.
pub(crate) enum CellState<T> {
    Pending,
    Value(T),
    Failed(Error),
}

pub(crate) struct CellInner<T> {
    state: CellState<T>,
    callbacks: CallbackList,
    promises: usize,
    futures: usize,
    /// A never cell stays pending without tripping broken-promise logic.
    never: bool,
    /// Task to cancel if the future side fully disengages while pending.
    cancel_hook: Option<TaskId>,
}

/// Shared handle to a cell's interior. Crate-internal; user code goes
/// through `Promise`/`Future`.
pub(crate) struct Cell<T>(Rc<RefCell<CellInner<T>>>);

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> Cell<T> {
    pub(crate) fn new(promises: usize, futures: usize) -> Self {
        Self(Rc::new(RefCell::new(CellInner {
            state: CellState::Pending,
            callbacks: CallbackList::default(),
            promises,
            futures,
            never: false,
            cancel_hook: None,
        })))
    }

    pub(crate) fn resolved(state: CellState<T>) -> Self {
        Self(Rc::new(RefCell::new(CellInner {
            state,
            callbacks: CallbackList::default(),
            promises: 0,
            futures: 1,
            never: false,
            cancel_hook: None,
        })))
    }

    pub(crate) fn never() -> Self {
        let cell = Self::new(0, 1);
        cell.0.borrow_mut().never = true;
        cell
    }

    pub(crate) fn downgrade(&self) -> WeakCell<T> {
        WeakCell(Rc::downgrade(&self.0))
    }

    /// Pending -> Value transition. Fatal if the cell is already resolved.
    pub(crate) fn send(&self, value: T) {
        let callbacks = {
            let mut inner = self.0.borrow_mut();
            assert!(
                matches!(inner.state, CellState::Pending),
                "cell resolved twice (future_already_set)"
            );
            inner.state = CellState::Value(value);
            inner.callbacks.take_all()
        };
        for (_, cb) in callbacks {
            cb.fire();
        }
    }

    /// Pending -> Error transition. Fatal if the cell is already resolved.
    pub(crate) fn send_error(&self, error: Error) {
        let callbacks = {
            let mut inner = self.0.borrow_mut();
            assert!(
                matches!(inner.state, CellState::Pending),
                "cell resolved twice (future_already_set)"
            );
            inner.state = CellState::Failed(error);
            inner.callbacks.take_all()
        };
        for (_, cb) in callbacks {
            cb.fire();
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        !matches!(self.0.borrow().state, CellState::Pending)
    }

    pub(crate) fn is_error(&self) -> bool {
        matches!(self.0.borrow().state, CellState::Failed(_))
    }

    pub(crate) fn can_be_set(&self) -> bool {
        matches!(self.0.borrow().state, CellState::Pending)
    }

    pub(crate) fn error(&self) -> Option<Error> {
        match &self.0.borrow().state {
            CellState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Registers a callback on a pending cell. The caller is responsible
    /// for handling the already-resolved case.
    pub(crate) fn add_callback(&self, cb: Callback) -> u64 {
        let mut inner = self.0.borrow_mut();
        debug_assert!(matches!(inner.state, CellState::Pending));
        inner.callbacks.add(cb)
    }

    pub(crate) fn replace_callback(&self, id: u64, cb: Callback) {
        self.0.borrow_mut().callbacks.replace(id, cb);
    }

    pub(crate) fn remove_callback(&self, id: u64) {
        self.0.borrow_mut().callbacks.remove(id);
    }

    pub(crate) fn set_cancel_hook(&self, task: TaskId) {
        self.0.borrow_mut().cancel_hook = Some(task);
    }

    pub(crate) fn promise_ref(&self) {
        self.0.borrow_mut().promises += 1;
    }

    pub(crate) fn promise_unref(&self) {
        let fire_broken = {
            let mut inner = self.0.borrow_mut();
            inner.promises -= 1;
            inner.promises == 0 && !inner.never && matches!(inner.state, CellState::Pending)
        };
        if fire_broken {
            self.send_error(Error::broken_promise());
        }
    }

    pub(crate) fn future_ref(&self) {
        self.0.borrow_mut().futures += 1;
    }

    /// Dropping the last future-side reference cancels every pending
    /// subscription; if the cell backs an actor's output it also cancels
    /// the actor.
    pub(crate) fn future_unref(&self) {
        let hook = {
            let mut inner = self.0.borrow_mut();
            inner.futures -= 1;
            if inner.futures > 0 {
                return;
            }
            inner.callbacks.clear();
            if matches!(inner.state, CellState::Pending) {
                inner.cancel_hook.take()
            } else {
                None
            }
        };
        if let Some(task) = hook {
            runtime::cancel_task(task);
        }
    }

    #[cfg(test)]
    pub(crate) fn live_callbacks(&self) -> usize {
        self.0.borrow().callbacks.live()
    }
}

impl<T: Clone + 'static> Cell<T> {
    /// Snapshot of a resolved cell; `None` while pending.
    pub(crate) fn result(&self) -> Option<crate::error::Result<T>> {
        match &self.0.borrow().state {
            CellState::Pending => None,
            CellState::Value(v) => Some(Ok(v.clone())),
            CellState::Failed(e) => Some(Err(e.clone())),
        }
    }
}

/// Weak view of a cell, held by subscriptions so that cancelling one never
/// extends the cell's lifetime.
pub(crate) struct WeakCell<T>(Weak<RefCell<CellInner<T>>>);

impl<T> WeakCell<T> {
    pub(crate) fn remove_callback(&self, id: u64) {
        if let Some(inner) = self.0.upgrade() {
            inner.borrow_mut().callbacks.remove(id);
        }
    }
}
