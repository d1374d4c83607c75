//! The loop's time source.

use std::cell::Cell;
use std::time::Instant;

/// How `now()` reads the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// `now()` returns a value cached once per loop turn. Cheap, and every
    /// task dispatched in one turn observes the same time.
    Cached,
    /// `now()` reads the high-resolution clock on every call.
    Precise,
}

/// Monotonic seconds since the runtime was created.
pub(crate) struct Clock {
    start: Instant,
    mode: Cell<ClockMode>,
    cached: Cell<f64>,
}

impl Clock {
    pub(crate) fn new(mode: ClockMode) -> Self {
        Self {
            start: Instant::now(),
            mode: Cell::new(mode),
            cached: Cell::new(0.0),
        }
    }

    pub(crate) fn mode(&self) -> ClockMode {
        self.mode.get()
    }

    pub(crate) fn set_mode(&self, mode: ClockMode) {
        self.mode.set(mode);
    }

    /// Re-reads the clock and updates the per-turn cache.
    pub(crate) fn refresh(&self) -> f64 {
        let t = self.precise();
        self.cached.set(t);
        t
    }

    pub(crate) fn now(&self) -> f64 {
        match self.mode.get() {
            ClockMode::Cached => self.cached.get(),
            ClockMode::Precise => self.precise(),
        }
    }

    pub(crate) fn precise(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_mode_is_stable_between_refreshes() {
        let clock = Clock::new(ClockMode::Cached);
        clock.refresh();
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!((clock.now() - a).abs() < f64::EPSILON);
        clock.refresh();
        assert!(clock.now() >= a);
    }

    #[test]
    fn precise_mode_advances() {
        let clock = Clock::new(ClockMode::Precise);
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now() > a);
    }
}
