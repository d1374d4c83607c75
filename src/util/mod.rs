//! Internal utilities: deterministic randomness and unique ids.

mod rng;

pub use rng::DeterministicRandom;

use core::fmt;

/// A 128-bit identifier, printed as 32 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Uid {
    parts: [u64; 2],
}

impl Uid {
    /// Builds an id from its two halves.
    #[must_use]
    pub const fn from_parts(first: u64, second: u64) -> Self {
        Self {
            parts: [first, second],
        }
    }

    /// The two halves.
    #[must_use]
    pub const fn parts(&self) -> [u64; 2] {
        self.parts
    }

    /// First sixteen hex digits; enough to grep for.
    #[must_use]
    pub fn short_string(&self) -> String {
        format!("{:016x}", self.parts[0])
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.parts[0], self.parts[1])
    }
}
