use std::fmt;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

/// Live counters shared with the capture thread.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub samples: AtomicU64,
}

/// End-of-session summary, computed once the capture loop has fully
/// stopped so the count is final.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub samples: u64,
    pub elapsed: Duration,
    pub rate_hz: f64,
}

impl SessionReport {
    pub fn new(samples: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate_hz = if secs > 0.0 { samples as f64 / secs } else { 0.0 };
        Self {
            samples,
            elapsed,
            rate_hz,
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples in {:.1}s ({:.1} Hz)",
            self.samples,
            self.elapsed.as_secs_f64(),
            self.rate_hz
        )
    }
}
