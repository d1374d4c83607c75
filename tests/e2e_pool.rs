//! End-to-end thread-pool offload scenarios.
//!
//! Run with: `cargo test --test e2e_pool`

use riptide::pool::{ThreadAction, ThreadPool, ThreadPoolReceiver};
use riptide::{Net, Result, Void};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

struct Hasher {
    init_thread: Option<ThreadId>,
    lifecycle: Arc<Mutex<Vec<(String, ThreadId)>>>,
}

impl ThreadPoolReceiver for Hasher {
    fn init(&mut self) {
        let id = std::thread::current().id();
        self.init_thread = Some(id);
        self.lifecycle.lock().unwrap().push(("init".into(), id));
    }
}

impl Drop for Hasher {
    fn drop(&mut self) {
        self.lifecycle
            .lock()
            .unwrap()
            .push(("drop".into(), std::thread::current().id()));
    }
}

struct Digest(Vec<u8>);

impl ThreadAction<Hasher> for Digest {
    type Output = u64;

    fn run(self, receiver: &mut Hasher) -> Result<u64> {
        assert_eq!(
            receiver.init_thread,
            Some(std::thread::current().id()),
            "action ran on a thread that does not own the receiver"
        );
        // Stand-in for blocking work (fsync, key derivation).
        Ok(self.0.iter().fold(0u64, |h, &b| h.wrapping_mul(31).wrapping_add(u64::from(b))))
    }
}

#[test]
fn results_arrive_on_the_network_thread_after_the_posting_task_returns() {
    init_test_logging();
    let net = Net::new();
    let pool = Arc::new(ThreadPool::new());
    pool.add_thread(Hasher {
        init_thread: None,
        lifecycle: Arc::new(Mutex::new(Vec::new())),
    });

    let posted = Arc::new(AtomicUsize::new(0));
    let posted2 = Arc::clone(&posted);
    let net2 = net.clone();
    let pool2 = Arc::clone(&pool);
    let out = net.spawn(async move {
        let result = pool2.post(Digest(vec![1, 2, 3]));
        posted2.store(1, Ordering::SeqCst);
        // The result resolves on a later loop iteration, never inside
        // `post`.
        let digest = result.await?;
        assert_eq!(posted2.load(Ordering::SeqCst), 1);
        net2.stop();
        Ok(digest)
    });
    net.run();
    assert!(out.is_ready());
    assert_eq!(out.get(), Digest(vec![1, 2, 3]).run(&mut hasher_stub()).unwrap());
    pool.stop();
}

fn hasher_stub() -> Hasher {
    let mut h = Hasher {
        init_thread: None,
        lifecycle: Arc::new(Mutex::new(Vec::new())),
    };
    h.init_thread = Some(std::thread::current().id());
    h
}

#[test]
fn receiver_lifecycle_stays_on_its_worker_thread() {
    init_test_logging();
    let lifecycle = Arc::new(Mutex::new(Vec::new()));
    let pool = ThreadPool::new();
    pool.add_thread(Hasher {
        init_thread: None,
        lifecycle: Arc::clone(&lifecycle),
    });
    let f = pool.post(Digest(vec![9]));
    f.block().unwrap();
    pool.stop();

    let events = lifecycle.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "init");
    assert_eq!(events[1].0, "drop");
    // init and drop happened on the same (worker) thread, not ours.
    assert_eq!(events[0].1, events[1].1);
    assert_ne!(events[0].1, std::thread::current().id());
}

#[test]
fn stop_drains_everything_posted_before_it() {
    init_test_logging();
    let pool = ThreadPool::new();
    pool.add_thread(Hasher {
        init_thread: None,
        lifecycle: Arc::new(Mutex::new(Vec::new())),
    });
    let futures: Vec<_> = (0..64)
        .map(|i| pool.post(Digest(vec![i as u8; 64])))
        .collect();
    pool.stop();
    for f in futures {
        assert!(f.block().is_ok());
    }
}

#[test]
fn many_offloads_interleave_with_timers() {
    init_test_logging();
    let net = Net::new();
    let pool = Arc::new(ThreadPool::new());
    for _ in 0..3 {
        pool.add_thread(Hasher {
            init_thread: None,
            lifecycle: Arc::new(Mutex::new(Vec::new())),
        });
    }
    let net2 = net.clone();
    let pool2 = Arc::clone(&pool);
    let out = net.spawn(async move {
        let mut total = 0u64;
        for round in 0..10u8 {
            let work = pool2.post(Digest(vec![round; 32]));
            net2.delay(0.001).await?;
            total = total.wrapping_add(work.await?);
        }
        net2.stop();
        Ok(total)
    });
    net.run();
    assert!(out.is_ready());
    assert!(!out.is_error());
    pool.stop();
}

#[test]
fn offload_errors_propagate_to_the_awaiting_actor() {
    init_test_logging();
    struct Fail;
    impl ThreadAction<Hasher> for Fail {
        type Output = Void;
        fn run(self, _: &mut Hasher) -> Result<Void> {
            Err(riptide::Error::new(riptide::ErrorKind::IoError))
        }
    }

    let net = Net::new();
    let pool = Arc::new(ThreadPool::new());
    pool.add_thread(Hasher {
        init_thread: None,
        lifecycle: Arc::new(Mutex::new(Vec::new())),
    });
    let net2 = net.clone();
    let pool2 = Arc::clone(&pool);
    let out = net.spawn(async move {
        let seen = pool2.post(Fail).await;
        net2.stop();
        seen
    });
    net.run();
    assert!(out.is_error());
    assert_eq!(out.get_error().kind(), riptide::ErrorKind::IoError);
    pool.stop();
}
