//! Deterministic pseudo-random number generator.
//!
//! xorshift64: fast, dependency-free, and reproducible. Given the same
//! seed, every context generates the same sequence, which is what makes
//! scenario runs replayable. Not cryptographically secure.

use crate::util::Uid;

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A deterministic generator owned by one runtime context.
#[derive(Debug, Clone)]
pub struct DeterministicRandom {
    state: u64,
}

impl DeterministicRandom {
    /// Creates a generator. A zero seed is replaced with 1.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform double in `[0, 1)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn random01(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[min, max_exclusive)`.
    ///
    /// # Panics
    ///
    /// Panics if the range is empty.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn random_int(&mut self, min: i64, max_exclusive: i64) -> i64 {
        assert!(min < max_exclusive, "empty random range");
        let span = (max_exclusive - min) as u64;
        min + (self.next_u64() % span) as i64
    }

    /// Random boolean.
    pub fn random_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// Random alphanumeric string of the given length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn random_alphanumeric(&mut self, length: usize) -> String {
        (0..length)
            .map(|_| {
                let index = (self.next_u64() % ALPHANUMERIC.len() as u64) as usize;
                ALPHANUMERIC[index] as char
            })
            .collect()
    }

    /// Random 128-bit unique id.
    pub fn random_unique_id(&mut self) -> Uid {
        Uid::from_parts(self.next_u64(), self.next_u64())
    }
}
