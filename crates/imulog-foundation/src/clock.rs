//! Clock abstraction so time-dependent capture logic can run against
//! virtual time in tests.

use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// Real-time clock implementation
pub struct RealClock;

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for deterministic testing
pub struct TestClock {
    current_time: std::sync::Mutex<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            current_time: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Advance the virtual clock by the specified duration
    pub fn advance(&self, duration: Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.current_time.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        // In virtual time, sleep just advances the clock
        self.advance(duration);
        std::thread::yield_now();
    }
}

/// Thread-safe clock that can be shared across threads
pub type SharedClock = std::sync::Arc<dyn Clock + Send + Sync>;

pub fn real_clock() -> SharedClock {
    std::sync::Arc::new(RealClock::new())
}
