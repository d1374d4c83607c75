//! The cross-thread single-assignment cell.
//!
//! A minority of cells carry results from pool workers back to the
//! network thread. Those take a mutex for state transitions and waker
//! registration, and deliver through the loop's injector, so the fast
//! path (network-thread-only cells in [`crate::cell`]) stays lock-free.
//!
//! Resolution is observed on a later loop iteration, never synchronously
//! with the send.

use crate::error::{Error, Result};
use crate::select::Selectable;
use parking_lot::{Condvar, Mutex};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct State<T> {
    result: Option<Result<T>>,
    waker: Option<Waker>,
    promises: usize,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
}

impl<T> Shared<T> {
    fn resolve(&self, result: Result<T>) {
        let waker = {
            let mut state = self.state.lock();
            assert!(
                state.result.is_none(),
                "cell resolved twice (future_already_set)"
            );
            state.result = Some(result);
            state.waker.take()
        };
        self.condvar.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn try_resolve(&self, result: Result<T>) -> bool {
        let waker = {
            let mut state = self.state.lock();
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result);
            state.waker.take()
        };
        self.condvar.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }
}

/// Creates a cross-thread promise/future pair.
#[must_use]
pub fn channel<T: Send + 'static>() -> (ThreadSafePromise<T>, ThreadFuture<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            result: None,
            waker: None,
            promises: 1,
        }),
        condvar: Condvar::new(),
    });
    (
        ThreadSafePromise {
            shared: Arc::clone(&shared),
        },
        ThreadFuture { shared },
    )
}

/// Write side; usable from any thread, exactly once.
pub struct ThreadSafePromise<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ThreadSafePromise<T> {
    /// Resolves with a value. Fatal if already resolved.
    pub fn send(&self, value: T) {
        self.shared.resolve(Ok(value));
    }

    /// Resolves with an error. Fatal if already resolved.
    pub fn send_error(&self, error: Error) {
        self.shared.resolve(Err(error));
    }

    /// Resolves with a value unless already resolved. Returns false if the
    /// cell was already set.
    pub fn try_send(&self, value: T) -> bool {
        self.shared.try_resolve(Ok(value))
    }

    /// Returns true once the cell is resolved.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.shared.state.lock().result.is_some()
    }
}

impl<T: Send + 'static> Clone for ThreadSafePromise<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().promises += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> Drop for ThreadSafePromise<T> {
    fn drop(&mut self) {
        let broken = {
            let mut state = self.shared.state.lock();
            state.promises -= 1;
            state.promises == 0 && state.result.is_none()
        };
        if broken {
            self.shared.try_resolve(Err(Error::broken_promise()));
        }
    }
}

/// Read side; awaited on the network thread. Single consumer.
pub struct ThreadFuture<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ThreadFuture<T> {
    /// Returns true once the cell is resolved.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.state.lock().result.is_some()
    }

    /// Blocks the calling thread until the cell resolves.
    ///
    /// Never call this on the network thread while the loop is expected to
    /// make progress; it is intended for shutdown paths.
    pub fn block(self) -> Result<T> {
        let mut state = self.shared.state.lock();
        while state.result.is_none() {
            self.shared.condvar.wait(&mut state);
        }
        state.result.take().expect("resolved cell lost its result")
    }
}

impl<T: Send + 'static> Unpin for ThreadFuture<T> {}

impl<T: Send + 'static> std::future::Future for ThreadFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if crate::runtime::current_task_cancelled() {
            return Poll::Ready(Err(Error::actor_cancelled()));
        }
        let mut state = self.shared.state.lock();
        if state.result.is_some() {
            return Poll::Ready(state.result.take().expect("result vanished"));
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T: Send + 'static> Selectable for ThreadFuture<T> {
    fn ready_now(&self) -> bool {
        self.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::future::Future;

    #[test]
    fn block_receives_value_from_another_thread() {
        let (tx, rx) = channel::<i32>();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            tx.send(12);
        });
        assert_eq!(rx.block().unwrap(), 12);
        handle.join().unwrap();
    }

    #[test]
    fn dropping_all_promises_breaks_the_cell() {
        let (tx, rx) = channel::<i32>();
        let tx2 = tx.clone();
        drop(tx);
        drop(tx2);
        assert_eq!(rx.block().unwrap_err().kind(), ErrorKind::BrokenPromise);
    }

    #[test]
    fn try_send_after_resolution_is_rejected() {
        let (tx, rx) = channel::<i32>();
        assert!(tx.try_send(1));
        assert!(!tx.try_send(2));
        assert_eq!(rx.block().unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "future_already_set")]
    fn double_send_is_fatal() {
        let (tx, _rx) = channel::<i32>();
        tx.send(1);
        tx.send(2);
    }

    #[test]
    fn poll_registers_a_waker() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::task::Wake;

        struct Flag(AtomicBool);
        impl Wake for Flag {
            fn wake(self: Arc<Self>) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let waker = Waker::from(Arc::clone(&flag));
        let mut cx = Context::from_waker(&waker);

        let (tx, mut rx) = channel::<i32>();
        assert!(Pin::new(&mut rx).poll(&mut cx).is_pending());
        tx.send(3);
        assert!(flag.0.load(Ordering::SeqCst));
        match Pin::new(&mut rx).poll(&mut cx) {
            Poll::Ready(Ok(3)) => {}
            other => panic!("unexpected poll result: {other:?}"),
        }
    }
}
