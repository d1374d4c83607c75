//! User-facing handles over single-assignment cells.
//!
//! `Promise<T>` writes, `Future<T>` reads, and `PromiseStream<T>` /
//! `FutureStream<T>` multiplex an ordered sequence of resolutions. A
//! `Future` is awaitable inside an actor; awaiting a ready cell continues
//! without suspension, awaiting a pending cell registers a resume
//! callback and returns control to the scheduler.

use crate::cell::{Callback, Cell, CellState, WeakCell};
use crate::error::{Error, Result};
use crate::runtime;
use crate::runtime::TaskId;
use crate::select::Selectable;
use std::cell::Cell as StdCell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// The unit value carried by futures that signal completion only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Void;

/// The write side of a cell. At most one `send`/`send_error` succeeds;
/// a second resolution is a fatal invariant violation.
pub struct Promise<T: 'static> {
    cell: Cell<T>,
}

impl<T: 'static> Promise<T> {
    /// Creates a promise with a fresh pending cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: Cell::new(1, 0),
        }
    }

    /// Returns a future-side handle to the same cell.
    #[must_use]
    pub fn get_future(&self) -> Future<T> {
        self.cell.future_ref();
        Future {
            cell: self.cell.clone(),
            registered: StdCell::new(None),
        }
    }

    /// Resolves the cell with a value, firing callbacks synchronously in
    /// insertion order.
    pub fn send(&self, value: T) {
        self.cell.send(value);
    }

    /// Resolves the cell with an error.
    pub fn send_error(&self, error: Error) {
        self.cell.send_error(error);
    }

    /// Returns true once the cell has been resolved.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.cell.is_resolved()
    }

    /// Returns true while the cell is still pending.
    #[must_use]
    pub fn can_be_set(&self) -> bool {
        self.cell.can_be_set()
    }

}

impl<T: 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Promise<T> {
    fn clone(&self) -> Self {
        self.cell.promise_ref();
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        self.cell.promise_unref();
    }
}

/// The read side of a cell.
///
/// Cloning adds a future-side reference; dropping the last one cancels
/// all pending subscriptions (and the backing actor, if any).
pub struct Future<T: 'static> {
    cell: Cell<T>,
    /// Callback registered by an in-flight await: its id in the cell's
    /// list plus the task that registered it (`None` for a waker).
    registered: StdCell<Option<(u64, Option<TaskId>)>>,
}

impl<T: 'static> Future<T> {
    /// A future that is already resolved with `value`.
    #[must_use]
    pub fn ready(value: T) -> Self {
        Self {
            cell: Cell::resolved(CellState::Value(value)),
            registered: StdCell::new(None),
        }
    }

    /// A future that is already resolved with `error`.
    #[must_use]
    pub fn from_error(error: Error) -> Self {
        Self {
            cell: Cell::resolved(CellState::Failed(error)),
            registered: StdCell::new(None),
        }
    }

    /// A future that never resolves and is never broken. The inert arm of
    /// a `choose`.
    #[must_use]
    pub fn never() -> Self {
        Self {
            cell: Cell::never(),
            registered: StdCell::new(None),
        }
    }

    /// Returns true once the cell is resolved (with a value or an error).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.is_resolved()
    }

    /// Returns true if the cell resolved with an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.cell.is_error()
    }

    /// Returns the resolution error.
    ///
    /// # Panics
    ///
    /// Panics if the cell did not resolve with an error.
    #[must_use]
    pub fn get_error(&self) -> Error {
        self.cell.error().expect("future did not resolve with an error")
    }

    pub(crate) fn cell(&self) -> &Cell<T> {
        &self.cell
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Returns the resolved value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is pending or resolved with an error; use
    /// `.await` for error flow.
    #[must_use]
    pub fn get(&self) -> T {
        match self.cell.result() {
            Some(Ok(v)) => v,
            Some(Err(e)) => panic!("future resolved with error: {e}"),
            None => panic!("future is not ready"),
        }
    }

    /// Registers a callback invoked with the resolution, synchronously if
    /// the cell is already resolved. The returned subscription cancels in
    /// O(1) and holds no strong reference to the cell.
    pub fn on_ready(&self, f: impl FnOnce(Result<T>) + 'static) -> Subscription<T> {
        if let Some(result) = self.cell.result() {
            f(result);
            return Subscription { cell: None };
        }
        let handle = self.clone();
        let index = self.cell.add_callback(Callback::Notify(Box::new(move || {
            let result = handle
                .cell
                .result()
                .expect("callback fired on a pending cell");
            f(result);
        })));
        Subscription {
            cell: Some((self.cell.downgrade(), index)),
        }
    }
}

impl<T: 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        self.cell.future_ref();
        Self {
            cell: self.cell.clone(),
            registered: StdCell::new(None),
        }
    }
}

impl<T: 'static> Drop for Future<T> {
    fn drop(&mut self) {
        if let Some((id, _)) = self.registered.take() {
            self.cell.remove_callback(id);
        }
        self.cell.future_unref();
    }
}

impl<T: 'static> Unpin for Future<T> {}

impl<T: Clone + 'static> std::future::Future for Future<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if runtime::current_task_cancelled() {
            return Poll::Ready(Err(Error::actor_cancelled()));
        }
        if let Some(result) = this.cell.result() {
            this.registered.set(None);
            return Poll::Ready(result);
        }
        let owner = runtime::current_task();
        let callback = || match owner {
            Some(task) => Callback::Resume(task),
            None => Callback::Wake(cx.waker().clone()),
        };
        match this.registered.get() {
            None => {
                let id = this.cell.add_callback(callback());
                this.registered.set(Some((id, owner)));
            }
            // Re-register when the handle moved to a different task, or
            // refresh the waker when polled outside one.
            Some((id, registered_owner)) if registered_owner != owner || owner.is_none() => {
                this.cell.replace_callback(id, callback());
                this.registered.set(Some((id, owner)));
            }
            Some(_) => {}
        }
        Poll::Pending
    }
}

impl<T: Clone + 'static> Selectable for Future<T> {
    fn ready_now(&self) -> bool {
        self.cell.is_resolved()
    }
}

/// A future that never resolves; the inert arm of a `choose`.
#[must_use]
pub fn never<T: 'static>() -> Future<T> {
    Future::never()
}

/// A cancellable registration of a callback on a cell.
///
/// Dropping the subscription does not cancel it; call [`Subscription::cancel`].
pub struct Subscription<T: 'static> {
    cell: Option<(WeakCell<T>, u64)>,
}

impl<T: 'static> Subscription<T> {
    /// Removes the callback if it has not fired yet.
    pub fn cancel(mut self) {
        if let Some((cell, index)) = self.cell.take() {
            cell.remove_callback(index);
        }
    }
}

/// Shared state of a stream: an ordered queue of values, each consumed by
/// exactly one `wait_next`.
struct StreamInner<T> {
    queue: VecDeque<T>,
    closed: Option<Error>,
    waiters: crate::cell::CallbackList,
    promises: usize,
    futures: usize,
}

struct StreamCell<T>(Rc<RefCell<StreamInner<T>>>);

impl<T> Clone for StreamCell<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

/// The producer side of a stream.
pub struct PromiseStream<T: 'static> {
    inner: StreamCell<T>,
}

impl<T: 'static> PromiseStream<T> {
    /// Creates a stream with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: StreamCell(Rc::new(RefCell::new(StreamInner {
                queue: VecDeque::new(),
                closed: None,
                waiters: crate::cell::CallbackList::default(),
                promises: 1,
                futures: 0,
            }))),
        }
    }

    /// Enqueues a value, waking the oldest waiter if one is suspended.
    pub fn send(&self, value: T) {
        let waiter = {
            let mut inner = self.inner.0.borrow_mut();
            assert!(
                inner.closed.is_none(),
                "send on a closed stream (future_already_set)"
            );
            inner.queue.push_back(value);
            inner.waiters.take_first()
        };
        if let Some(cb) = waiter {
            cb.fire();
        }
    }

    /// Closes the stream with an error; every current and future waiter
    /// observes it once the queue drains.
    pub fn send_error(&self, error: Error) {
        let waiters = {
            let mut inner = self.inner.0.borrow_mut();
            assert!(
                inner.closed.is_none(),
                "send_error on a closed stream (future_already_set)"
            );
            inner.closed = Some(error);
            inner.waiters.take_all()
        };
        for (_, cb) in waiters {
            cb.fire();
        }
    }

    /// Returns a consumer-side handle.
    #[must_use]
    pub fn get_future(&self) -> FutureStream<T> {
        self.inner.0.borrow_mut().futures += 1;
        FutureStream {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for PromiseStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for PromiseStream<T> {
    fn clone(&self) -> Self {
        self.inner.0.borrow_mut().promises += 1;
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Drop for PromiseStream<T> {
    fn drop(&mut self) {
        let waiters = {
            let mut inner = self.inner.0.borrow_mut();
            inner.promises -= 1;
            if inner.promises > 0 || inner.closed.is_some() {
                return;
            }
            inner.closed = Some(Error::end_of_stream());
            inner.waiters.take_all()
        };
        for (_, cb) in waiters {
            cb.fire();
        }
    }
}

/// The consumer side of a stream.
pub struct FutureStream<T: 'static> {
    inner: StreamCell<T>,
}

impl<T: 'static> FutureStream<T> {
    /// Returns true if `wait_next` would complete without suspending.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let inner = self.inner.0.borrow();
        !inner.queue.is_empty() || inner.closed.is_some()
    }

    /// Awaits the next value in the stream. Each value is delivered to at
    /// most one waiter; waiters are served in FIFO order.
    #[must_use]
    pub fn wait_next(&self) -> WaitNext<'_, T> {
        WaitNext {
            stream: self,
            registered: None,
        }
    }
}

impl<T: 'static> Clone for FutureStream<T> {
    fn clone(&self) -> Self {
        self.inner.0.borrow_mut().futures += 1;
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Drop for FutureStream<T> {
    fn drop(&mut self) {
        let mut inner = self.inner.0.borrow_mut();
        inner.futures -= 1;
        if inner.futures == 0 {
            inner.waiters.clear();
        }
    }
}

/// The suspension of one `wait_next` call.
pub struct WaitNext<'a, T: 'static> {
    stream: &'a FutureStream<T>,
    registered: Option<u64>,
}

impl<T: 'static> Unpin for WaitNext<'_, T> {}

impl<T: 'static> std::future::Future for WaitNext<'_, T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if runtime::current_task_cancelled() {
            return Poll::Ready(Err(Error::actor_cancelled()));
        }
        let mut inner = this.stream.inner.0.borrow_mut();
        if let Some(value) = inner.queue.pop_front() {
            this.registered = None;
            return Poll::Ready(Ok(value));
        }
        if let Some(error) = inner.closed.clone() {
            this.registered = None;
            return Poll::Ready(Err(error));
        }
        match this.registered {
            None => {
                let cb = match runtime::current_task() {
                    Some(task) => Callback::Resume(task),
                    None => Callback::Wake(cx.waker().clone()),
                };
                this.registered = Some(inner.waiters.add(cb));
            }
            Some(index) => {
                if runtime::current_task().is_none() {
                    inner
                        .waiters
                        .replace(index, Callback::Wake(cx.waker().clone()));
                }
            }
        }
        Poll::Pending
    }
}

impl<T: 'static> Selectable for WaitNext<'_, T> {
    fn ready_now(&self) -> bool {
        self.stream.is_ready()
    }
}

impl<T: 'static> Drop for WaitNext<'_, T> {
    fn drop(&mut self) {
        if let Some(index) = self.registered.take() {
            self.stream.inner.0.borrow_mut().waiters.remove(index);
        }
    }
}
