//! Size-classed buffer recycling with per-thread magazines.
//!
//! Hot paths (packet buffers, serialization scratch) allocate fixed-size
//! blocks constantly; this pool hands them out from a per-thread cache
//! and moves them between threads and the central depot in magazine-sized
//! batches, so the depot mutex is touched once per magazine rather than
//! once per block.

use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Block size classes, smallest first.
pub const CLASS_SIZES: [usize; 7] = [64, 128, 256, 512, 1024, 2048, 4096];

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Per-thread magazines, keyed by `(pool id, class index)`.
    static MAGAZINES: RefCell<HashMap<(u64, usize), Vec<Box<[u8]>>>> =
        RefCell::new(HashMap::new());
}

#[derive(Default)]
struct PoolStatsInner {
    allocations: AtomicU64,
    magazine_hits: AtomicU64,
    depot_transfers: AtomicU64,
}

/// Counters describing pool behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total blocks handed out.
    pub allocations: u64,
    /// Allocations served from a per-thread magazine.
    pub magazine_hits: u64,
    /// Magazine moves between a thread and the depot.
    pub depot_transfers: u64,
}

struct Depot {
    id: u64,
    magazine_size: usize,
    central: Vec<Mutex<Vec<Vec<Box<[u8]>>>>>,
    stats: PoolStatsInner,
}

impl Depot {
    fn class_of(size: usize) -> Option<usize> {
        CLASS_SIZES.iter().position(|&c| c >= size)
    }
}

/// A recycling allocator for fixed-size byte blocks.
#[derive(Clone)]
pub struct BufferPool {
    depot: Arc<Depot>,
}

impl BufferPool {
    /// Creates a pool with the given magazine size.
    #[must_use]
    pub fn new(magazine_size: usize) -> Self {
        Self {
            depot: Arc::new(Depot {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                magazine_size: magazine_size.max(1),
                central: CLASS_SIZES.iter().map(|_| Mutex::new(Vec::new())).collect(),
                stats: PoolStatsInner::default(),
            }),
        }
    }

    /// Allocates a block of at least `size` bytes. Fresh blocks are
    /// zeroed; recycled blocks keep their previous contents. Requests
    /// larger than the biggest class get a one-off block that is not
    /// recycled.
    #[must_use]
    pub fn alloc(&self, size: usize) -> PoolBlock {
        let depot = &self.depot;
        depot.stats.allocations.fetch_add(1, Ordering::Relaxed);
        let Some(class) = Depot::class_of(size) else {
            return PoolBlock {
                data: Some(vec![0u8; size].into_boxed_slice()),
                class: None,
                depot: Arc::clone(depot),
            };
        };

        let recycled = MAGAZINES.with(|magazines| {
            let mut magazines = magazines.borrow_mut();
            let magazine = magazines.entry((depot.id, class)).or_default();
            if let Some(block) = magazine.pop() {
                depot.stats.magazine_hits.fetch_add(1, Ordering::Relaxed);
                return Some(block);
            }
            let refill = depot.central[class].lock().pop();
            if let Some(refill) = refill {
                depot.stats.depot_transfers.fetch_add(1, Ordering::Relaxed);
                *magazine = refill;
                return magazine.pop();
            }
            None
        });

        let data = recycled
            .unwrap_or_else(|| vec![0u8; CLASS_SIZES[class]].into_boxed_slice());
        PoolBlock {
            data: Some(data),
            class: Some(class),
            depot: Arc::clone(depot),
        }
    }

    /// Behavior counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.depot.stats.allocations.load(Ordering::Relaxed),
            magazine_hits: self.depot.stats.magazine_hits.load(Ordering::Relaxed),
            depot_transfers: self.depot.stats.depot_transfers.load(Ordering::Relaxed),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32)
    }
}

/// An owned block; returns to its pool's magazine on drop.
pub struct PoolBlock {
    data: Option<Box<[u8]>>,
    class: Option<usize>,
    depot: Arc<Depot>,
}

impl PoolBlock {
    /// The block's capacity (its class size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// True for a zero-length block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Deref for PoolBlock {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PoolBlock {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PoolBlock {
    fn drop(&mut self) {
        let (Some(data), Some(class)) = (self.data.take(), self.class) else {
            return;
        };
        let depot = &self.depot;
        MAGAZINES.with(|magazines| {
            let mut magazines = magazines.borrow_mut();
            let magazine = magazines.entry((depot.id, class)).or_default();
            magazine.push(data);
            // Spill a full magazine to the depot, keeping the rest local.
            if magazine.len() >= depot.magazine_size * 2 {
                let spill = magazine.split_off(depot.magazine_size);
                depot.stats.depot_transfers.fetch_add(1, Ordering::Relaxed);
                depot.central[class].lock().push(spill);
            }
        });
    }
}
