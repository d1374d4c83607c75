//! Thread-pool offload for blocking work.
//!
//! Each worker thread permanently owns a *receiver* object supplied at
//! thread creation; the network thread posts typed actions, a worker runs
//! `action.run(&mut receiver)`, and the result travels back through a
//! cross-thread cell. Blocking operations (file I/O, fsync, DNS, key
//! derivation) never run on the network thread.
//!
//! Shutdown drains: every action posted before [`ThreadPool::stop`] either
//! runs to completion or is cancelled with `operation_cancelled`, and all
//! workers are joined. Receivers are dropped on their own threads.

use crate::error::{Error, Result};
use crate::threadsafe::{self, ThreadFuture};
use crossbeam_queue::SegQueue;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Park backstop so a missed notification cannot strand a worker.
const WORKER_PARK_TIMEOUT: Duration = Duration::from_millis(100);

/// An object owned by exactly one worker thread.
pub trait ThreadPoolReceiver: Send + 'static {
    /// Runs on the worker thread before any action is dispatched.
    fn init(&mut self) {}
}

/// A typed unit of work with a result.
pub trait ThreadAction<R>: Send + 'static {
    /// Value delivered through the action's result future.
    type Output: Send + 'static;

    /// Executes on a worker thread against its receiver.
    fn run(self, receiver: &mut R) -> Result<Self::Output>;
}

trait Job<R>: Send {
    fn run(self: Box<Self>, receiver: &mut R);
    fn cancel(self: Box<Self>);
}

struct FnJob<F> {
    f: F,
}

impl<R, F: FnOnce(&mut R) + Send> Job<R> for FnJob<F> {
    fn run(self: Box<Self>, receiver: &mut R) {
        (self.f)(receiver);
    }

    fn cancel(self: Box<Self>) {}
}

struct ActionJob<R, A: ThreadAction<R>> {
    action: A,
    promise: crate::threadsafe::ThreadSafePromise<A::Output>,
    _receiver: PhantomData<fn(&mut R)>,
}

impl<R, A: ThreadAction<R>> Job<R> for ActionJob<R, A> {
    fn run(self: Box<Self>, receiver: &mut R) {
        match self.action.run(receiver) {
            Ok(value) => self.promise.send(value),
            Err(error) => self.promise.send_error(error),
        }
    }

    fn cancel(self: Box<Self>) {
        self.promise.send_error(Error::operation_cancelled());
    }
}

struct PoolShared<R> {
    queue: SegQueue<Box<dyn Job<R>>>,
    lock: Mutex<()>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

/// A pool of worker threads, each bound to one receiver.
pub struct ThreadPool<R: ThreadPoolReceiver> {
    shared: Arc<PoolShared<R>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: ThreadPoolReceiver> ThreadPool<R> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PoolShared {
                queue: SegQueue::new(),
                lock: Mutex::new(()),
                condvar: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a worker owning `receiver`. The receiver's `init` runs first
    /// on that thread.
    pub fn add_thread(&self, receiver: R) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("pool-worker".into())
            .spawn(move || worker(&shared, receiver))
            .expect("failed to spawn pool worker");
        self.threads.lock().expect("pool thread list poisoned").push(handle);
    }

    /// Enqueues a fire-and-forget closure. FIFO per posting order.
    pub fn post_fn(&self, f: impl FnOnce(&mut R) + Send + 'static) {
        self.push(Box::new(FnJob { f }));
    }

    /// Enqueues a typed action and returns its result future. The future
    /// resolves on the network thread on a later loop iteration, always
    /// after the posting task has returned.
    pub fn post<A: ThreadAction<R>>(&self, action: A) -> ThreadFuture<A::Output> {
        let (promise, future) = threadsafe::channel();
        self.push(Box::new(ActionJob {
            action,
            promise,
            _receiver: PhantomData,
        }));
        future
    }

    fn push(&self, job: Box<dyn Job<R>>) {
        if self.shared.shutdown.load(Ordering::Acquire) {
            job.cancel();
            return;
        }
        self.shared.queue.push(job);
        self.shared.condvar.notify_one();
    }

    /// Drains the queue and joins every worker. Actions still queued when
    /// no worker remains to run them are cancelled.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.shared.lock.lock().expect("pool lock poisoned");
            self.shared.condvar.notify_all();
        }
        let handles = std::mem::take(&mut *self.threads.lock().expect("pool thread list poisoned"));
        for handle in handles {
            let _ = handle.join();
        }
        while let Some(job) = self.shared.queue.pop() {
            job.cancel();
        }
    }

    /// Number of actions waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }
}

impl<R: ThreadPoolReceiver> Default for ThreadPool<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ThreadPoolReceiver> Drop for ThreadPool<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker<R: ThreadPoolReceiver>(shared: &PoolShared<R>, mut receiver: R) {
    receiver.init();
    loop {
        if let Some(job) = shared.queue.pop() {
            job.run(&mut receiver);
            continue;
        }
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let guard = shared.lock.lock().expect("pool lock poisoned");
        if shared.queue.is_empty() && !shared.shutdown.load(Ordering::Acquire) {
            let _ = shared
                .condvar
                .wait_timeout(guard, WORKER_PARK_TIMEOUT)
                .expect("pool lock poisoned");
        }
    }
    // The receiver drops here, on its own thread.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Recorder {
        initialized: bool,
        seen: Vec<i32>,
        counter: Arc<AtomicUsize>,
    }

    impl ThreadPoolReceiver for Recorder {
        fn init(&mut self) {
            self.initialized = true;
        }
    }

    struct AddAction(i32);

    impl ThreadAction<Recorder> for AddAction {
        type Output = i32;

        fn run(self, receiver: &mut Recorder) -> Result<i32> {
            assert!(receiver.initialized);
            receiver.seen.push(self.0);
            receiver.counter.fetch_add(1, Ordering::SeqCst);
            Ok(self.0 * 2)
        }
    }

    fn pool_with_thread(counter: &Arc<AtomicUsize>) -> ThreadPool<Recorder> {
        let pool = ThreadPool::new();
        pool.add_thread(Recorder {
            initialized: false,
            seen: Vec::new(),
            counter: Arc::clone(counter),
        });
        pool
    }

    #[test]
    fn actions_run_on_the_worker_and_report_results() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with_thread(&counter);
        let result = pool.post(AddAction(21));
        assert_eq!(result.block().unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_drains_queued_actions() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with_thread(&counter);
        let futures: Vec<_> = (0..32).map(|i| pool.post(AddAction(i))).collect();
        pool.stop();
        for (i, f) in futures.into_iter().enumerate() {
            assert_eq!(f.block().unwrap(), (i as i32) * 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn post_after_stop_is_cancelled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = pool_with_thread(&counter);
        pool.stop();
        let result = pool.post(AddAction(1));
        assert_eq!(
            result.block().unwrap_err().kind(),
            crate::error::ErrorKind::OperationCancelled
        );
    }

    #[test]
    fn queued_actions_with_no_worker_are_cancelled_at_stop() {
        let pool: ThreadPool<Recorder> = ThreadPool::new();
        struct Never;
        impl ThreadAction<Recorder> for Never {
            type Output = ();
            fn run(self, _: &mut Recorder) -> Result<()> {
                Ok(())
            }
        }
        let f = pool.post(Never);
        pool.stop();
        assert_eq!(
            f.block().unwrap_err().kind(),
            crate::error::ErrorKind::OperationCancelled
        );
    }

    #[test]
    fn fifo_per_posting_order_on_one_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = ThreadPool::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        struct Push(Arc<Mutex<Vec<i32>>>, i32);
        impl ThreadAction<Recorder> for Push {
            type Output = ();
            fn run(self, _: &mut Recorder) -> Result<()> {
                self.0.lock().unwrap().push(self.1);
                Ok(())
            }
        }
        // Post before adding the thread so ordering is unambiguous.
        let futures: Vec<_> = (0..8).map(|i| pool.post(Push(Arc::clone(&seen), i))).collect();
        pool.add_thread(Recorder {
            initialized: false,
            seen: Vec::new(),
            counter: Arc::clone(&counter),
        });
        for f in futures {
            f.block().unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }
}
