//! The cooperative event loop ("network") and its task executor.
//!
//! A single dedicated thread runs the loop; every promise/future
//! operation, cell callback, and timer firing happens there, so none of
//! it is locked. The only cross-thread surface is the injector, through
//! which pool workers and cross-thread cells wake suspended tasks.
//!
//! There are no process-wide globals: each [`Net`] is a self-contained
//! runtime context, and the thread it was created on can reach it through
//! [`Net::current`]. Tests instantiate one context per scenario.

mod clock;
mod executor;
mod injector;
mod queue;
mod timer;

pub use clock::ClockMode;
pub use queue::Priority;

pub(crate) use executor::TaskId;

use crate::config::Knobs;
use crate::error::Result;
use crate::future::{Future, Promise, Void};
use crate::monitor::MachineState;
use crate::trace::TraceLog;
use crate::util::DeterministicRandom;
use clock::Clock;
use executor::Executor;
use injector::Injector;
use queue::{ReadyQueues, Task, TaskWork};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::Waker;
use std::time::Duration;
use timer::TimerHeap;

thread_local! {
    static CURRENT_NET: RefCell<Option<Weak<NetInner>>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct Stats {
    tasks_executed: Cell<u64>,
    turns: Cell<u64>,
    timers_fired: Cell<u64>,
    max_task_latency: Cell<f64>,
}

pub(crate) struct NetInner {
    clock: Clock,
    timers: RefCell<TimerHeap>,
    ready: RefCell<ReadyQueues>,
    executor: Executor,
    injector: Arc<Injector>,
    stopped: Cell<bool>,
    knobs: Rc<Knobs>,
    rng: RefCell<DeterministicRandom>,
    trace: Rc<TraceLog>,
    machine: RefCell<MachineState>,
    stats: Stats,
}

/// Handle to the runtime context. Cheap to clone; not `Send`.
#[derive(Clone)]
pub struct Net {
    inner: Rc<NetInner>,
}

impl Net {
    /// Creates a runtime context with default knobs and a fixed seed, and
    /// installs it as this thread's current context.
    ///
    /// # Panics
    ///
    /// Panics if another context is still alive on this thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Knobs::default(), 1)
    }

    /// Creates a context with a specific RNG seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_config(Knobs::default(), seed)
    }

    /// Creates a context with explicit knobs and seed.
    #[must_use]
    pub fn with_config(knobs: Knobs, seed: u64) -> Self {
        let knobs = Rc::new(knobs);
        let injector = Arc::new(Injector::default());
        let inner = Rc::new(NetInner {
            clock: Clock::new(ClockMode::Cached),
            timers: RefCell::new(TimerHeap::default()),
            ready: RefCell::new(ReadyQueues::default()),
            executor: Executor::new(Arc::clone(&injector)),
            injector,
            stopped: Cell::new(false),
            knobs: Rc::clone(&knobs),
            rng: RefCell::new(DeterministicRandom::new(seed)),
            trace: Rc::new(TraceLog::new(knobs)),
            machine: RefCell::new(MachineState::default()),
            stats: Stats::default(),
        });
        CURRENT_NET.with(|current| {
            let mut current = current.borrow_mut();
            assert!(
                current.as_ref().map_or(true, |w| w.upgrade().is_none()),
                "a runtime context is already installed on this thread"
            );
            *current = Some(Rc::downgrade(&inner));
        });
        let net = Self { inner };
        net.inner.clock.refresh();
        net
    }

    /// The context installed on this thread.
    ///
    /// # Panics
    ///
    /// Panics if no context is alive.
    #[must_use]
    pub fn current() -> Self {
        Self::try_current().expect("no runtime context on this thread")
    }

    /// The context installed on this thread, if one is alive.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        CURRENT_NET.with(|current| {
            current
                .borrow()
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|inner| Self { inner })
        })
    }

    /// Monotonic seconds since the context was created, read according to
    /// the current [`ClockMode`].
    #[must_use]
    pub fn now(&self) -> f64 {
        self.inner.clock.now()
    }

    /// High-resolution monotonic seconds, regardless of clock mode.
    #[must_use]
    pub fn precise_now(&self) -> f64 {
        self.inner.clock.precise()
    }

    /// Current clock mode.
    #[must_use]
    pub fn clock_mode(&self) -> ClockMode {
        self.inner.clock.mode()
    }

    /// Switches the clock mode.
    pub fn set_clock_mode(&self, mode: ClockMode) {
        self.inner.clock.set_mode(mode);
    }

    /// A future that resolves on a loop turn at least `seconds` from now.
    /// `delay(0.0)` is not synchronous: it resolves on a later turn.
    #[must_use]
    pub fn delay(&self, seconds: f64) -> Future<Void> {
        self.delay_priority(seconds, Priority::DEFAULT_DELAY)
    }

    /// [`Net::delay`] with an explicit priority class.
    #[must_use]
    pub fn delay_priority(&self, seconds: f64, priority: Priority) -> Future<Void> {
        let promise = Promise::new();
        let future = promise.get_future();
        let deadline = self.now() + seconds.max(0.0);
        self.inner
            .timers
            .borrow_mut()
            .add(deadline, priority, promise);
        future
    }

    /// A future that resolves on the next drain of the default yield
    /// class.
    #[must_use]
    pub fn yield_now(&self) -> Future<Void> {
        self.yield_priority(Priority::DEFAULT_YIELD)
    }

    /// [`Net::yield_now`] with an explicit priority class.
    #[must_use]
    pub fn yield_priority(&self, priority: Priority) -> Future<Void> {
        let promise = Promise::new();
        let future = promise.get_future();
        self.push_task(TaskWork::Fire(promise), priority);
        future
    }

    /// Enqueues a closure on the ready queue. FIFO within its class.
    pub fn post(&self, priority: Priority, f: impl FnOnce() + 'static) {
        self.push_task(TaskWork::Call(Box::new(f)), priority);
    }

    fn push_task(&self, work: TaskWork, priority: Priority) {
        self.inner.ready.borrow_mut().push(Task {
            work,
            priority,
            enqueued_at: self.inner.clock.now(),
        });
    }

    /// Starts an actor and returns its output future.
    ///
    /// The actor body runs synchronously to its first suspension point
    /// before `spawn` returns. Dropping every copy of the output future
    /// while the actor is suspended cancels it: the pending suspension
    /// point observes `actor_cancelled`.
    pub fn spawn<T: 'static>(
        &self,
        actor: impl std::future::Future<Output = Result<T>> + 'static,
    ) -> Future<T> {
        self.spawn_inner(actor, true)
    }

    /// Starts an actor whose output future cannot cancel it; cancellation
    /// requests are ignored until natural termination.
    pub fn spawn_uncancellable<T: 'static>(
        &self,
        actor: impl std::future::Future<Output = Result<T>> + 'static,
    ) -> Future<T> {
        self.spawn_inner(actor, false)
    }

    fn spawn_inner<T: 'static>(
        &self,
        actor: impl std::future::Future<Output = Result<T>> + 'static,
        cancellable: bool,
    ) -> Future<T> {
        let promise = Promise::new();
        let output = promise.get_future();
        let wrapper = async move {
            match actor.await {
                Ok(value) => promise.send(value),
                Err(error) => promise.send_error(error),
            }
        };
        let task = self.inner.executor.insert(
            Box::pin(wrapper),
            cancellable,
            Priority::DEFAULT_YIELD,
        );
        if cancellable {
            output.cell().set_cancel_hook(task);
        }
        self.inner.executor.resume(task);
        output
    }

    /// Runs the loop until [`Net::stop`]: expire timers, drain ready
    /// queues round-robin across priority classes under a per-class
    /// budget, then park on the injector until the next deadline or an
    /// external wake.
    pub fn run(&self) {
        while !self.inner.stopped.get() {
            self.turn();
        }
    }

    /// Requests loop exit. `run` returns after the task that called this
    /// finishes.
    pub fn stop(&self) {
        self.inner.stopped.set(true);
    }

    /// True once [`Net::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.get()
    }

    fn turn(&self) {
        let inner = &*self.inner;
        inner.stats.turns.set(inner.stats.turns.get() + 1);
        let now = inner.clock.refresh();

        loop {
            let expired = inner.timers.borrow_mut().pop_expired(now);
            let Some(entry) = expired else { break };
            inner
                .stats
                .timers_fired
                .set(inner.stats.timers_fired.get() + 1);
            inner.ready.borrow_mut().push(Task {
                work: TaskWork::Fire(entry.promise),
                priority: entry.priority,
                enqueued_at: now,
            });
        }

        for task in inner.injector.drain() {
            let task = TaskId(task);
            if let Some(priority) = inner.executor.priority_of(task) {
                inner.ready.borrow_mut().push(Task {
                    work: TaskWork::Resume(task),
                    priority,
                    enqueued_at: now,
                });
            }
        }

        // Round-robin across priority classes: one task per class per
        // pass, highest class first within a pass, until every class has
        // run dry or spent its per-turn budget. A backlog in one class
        // cannot monopolize the turn.
        let budget = inner.knobs.ready_queue_budget.max(1);
        let mut classes: Vec<(Priority, usize)> = inner
            .ready
            .borrow()
            .classes()
            .into_iter()
            .map(|class| (class, budget))
            .collect();
        loop {
            let mut progressed = false;
            for (class, remaining) in &mut classes {
                if *remaining == 0 {
                    continue;
                }
                if inner.stopped.get() {
                    return;
                }
                let task = inner.ready.borrow_mut().pop(*class);
                let Some(task) = task else {
                    *remaining = 0;
                    continue;
                };
                *remaining -= 1;
                let waited = inner.clock.now() - task.enqueued_at;
                if waited > inner.stats.max_task_latency.get() {
                    inner.stats.max_task_latency.set(waited);
                }
                inner
                    .stats
                    .tasks_executed
                    .set(inner.stats.tasks_executed.get() + 1);
                self.execute(task);
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        if inner.stopped.get() {
            return;
        }

        if inner.ready.borrow().is_empty() {
            let deadline = inner.timers.borrow().next_deadline();
            match deadline {
                Some(deadline) => {
                    let wait = deadline - inner.clock.precise();
                    if wait > 0.0 {
                        inner.injector.park(Some(Duration::from_secs_f64(wait)));
                    }
                }
                None => inner.injector.park(None),
            }
        }
    }

    fn execute(&self, task: Task) {
        match task.work {
            TaskWork::Fire(promise) => promise.send(Void),
            TaskWork::Resume(task) => self.inner.executor.resume(task),
            TaskWork::Wake(waker) => waker.wake(),
            TaskWork::Call(f) => f(),
        }
    }

    /// Number of ready tasks dispatched so far.
    #[must_use]
    pub fn tasks_executed(&self) -> u64 {
        self.inner.stats.tasks_executed.get()
    }

    /// Number of loop turns so far.
    #[must_use]
    pub fn loop_turns(&self) -> u64 {
        self.inner.stats.turns.get()
    }

    /// Number of timer entries fired so far.
    #[must_use]
    pub fn timers_fired(&self) -> u64 {
        self.inner.stats.timers_fired.get()
    }

    /// Worst queue latency observed by any dispatched task, in seconds.
    #[must_use]
    pub fn max_task_latency(&self) -> f64 {
        self.inner.stats.max_task_latency.get()
    }

    /// Number of resident (suspended or running) actor tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.executor.task_count()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn timer_count(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Uniform random double in `[0, 1)` from the context's deterministic
    /// generator.
    #[must_use]
    pub fn random01(&self) -> f64 {
        self.inner.rng.borrow_mut().random01()
    }

    /// Uniform random integer in `[min, max_exclusive)`.
    #[must_use]
    pub fn random_int(&self, min: i64, max_exclusive: i64) -> i64 {
        self.inner.rng.borrow_mut().random_int(min, max_exclusive)
    }

    /// Random alphanumeric string of the given length.
    #[must_use]
    pub fn random_alphanumeric(&self, length: usize) -> String {
        self.inner.rng.borrow_mut().random_alphanumeric(length)
    }

    /// Random 128-bit unique id.
    #[must_use]
    pub fn random_unique_id(&self) -> crate::util::Uid {
        self.inner.rng.borrow_mut().random_unique_id()
    }

    /// The context's trace log.
    #[must_use]
    pub fn trace_log(&self) -> Rc<TraceLog> {
        Rc::clone(&self.inner.trace)
    }

    /// The context's tunables.
    #[must_use]
    pub fn knobs(&self) -> Rc<Knobs> {
        Rc::clone(&self.inner.knobs)
    }

    /// Machine identity attached to telemetry events.
    #[must_use]
    pub fn machine_state(&self) -> MachineState {
        self.inner.machine.borrow().clone()
    }

    /// Installs machine identity by copying its public fields.
    pub fn init_machine_state(&self, state: MachineState) {
        *self.inner.machine.borrow_mut() = state;
    }

    pub(crate) fn injector(&self) -> Arc<Injector> {
        Arc::clone(&self.inner.injector)
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::new()
    }
}

/// `Net::current().delay(seconds)`.
#[must_use]
pub fn delay(seconds: f64) -> Future<Void> {
    Net::current().delay(seconds)
}

/// `Net::current().yield_now()`.
#[must_use]
pub fn yield_now() -> Future<Void> {
    Net::current().yield_now()
}

/// `Net::current().now()`.
#[must_use]
pub fn now() -> f64 {
    Net::current().now()
}

/// The task currently being polled, if the caller is inside one.
pub(crate) fn current_task() -> Option<TaskId> {
    Executor::current_task()
}

/// True if the caller is inside a task that has been cancelled.
pub(crate) fn current_task_cancelled() -> bool {
    let Some(task) = Executor::current_task() else {
        return false;
    };
    let Some(net) = Net::try_current() else {
        return false;
    };
    net.inner.executor.is_cancelled(task)
}

/// Synchronously polls a suspended task. No-op without a live context.
pub(crate) fn resume_task(task: TaskId) {
    if let Some(net) = Net::try_current() {
        net.inner.executor.resume(task);
    }
}

/// Delivers cancellation to a task. No-op without a live context.
pub(crate) fn cancel_task(task: TaskId) {
    if let Some(net) = Net::try_current() {
        net.inner.executor.cancel(task);
    }
}

/// Schedules a waker to fire on the next default-yield drain; wakes
/// immediately when no context is installed.
pub(crate) fn schedule_wake(waker: Waker) {
    match Net::try_current() {
        Some(net) => net.push_task(TaskWork::Wake(waker), Priority::DEFAULT_YIELD),
        None => waker.wake(),
    }
}
