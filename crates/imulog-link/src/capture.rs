use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use imulog_foundation::{CancelFlag, SharedClock};

use crate::handshake::{self, StopAck};
use crate::link::LineLink;
use crate::protocol;
use crate::sink::RecordSink;
use crate::stats::{CaptureStats, SessionReport};

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Hard session ceiling, independent of operator action.
    pub max_duration: Duration,
    /// Per-iteration bounded wait for one line.
    pub poll_timeout: Duration,
    /// Emit a status line every this many accepted records.
    pub progress_every: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration: protocol::MAX_CAPTURE,
            poll_timeout: protocol::POLL_TIMEOUT,
            progress_every: protocol::PROGRESS_INTERVAL,
        }
    }
}

/// Why the capture loop exited.
#[derive(Debug)]
pub enum StopReason {
    Cancelled,
    CeilingReached,
    LinkFailed,
    SinkFailed(std::io::Error),
}

/// The producer/consumer loop of one session: reads lines from the link,
/// forwards data records to the sink, and watches the clock and the
/// cancellation flag.
///
/// The engine owns the link and the sink for the session's lifetime; both
/// are released when it is dropped, and `finalize` runs on every exit path.
pub struct CaptureEngine<L: LineLink, S: RecordSink> {
    link: L,
    sink: S,
    cancel: CancelFlag,
    clock: SharedClock,
    cfg: CaptureConfig,
    stats: Arc<CaptureStats>,
    elapsed: Duration,
    finalized: bool,
}

impl<L: LineLink, S: RecordSink> CaptureEngine<L, S> {
    pub fn new(link: L, sink: S, cancel: CancelFlag, clock: SharedClock, cfg: CaptureConfig) -> Self {
        Self {
            link,
            sink,
            cancel,
            clock,
            cfg,
            stats: Arc::new(CaptureStats::default()),
            elapsed: Duration::ZERO,
            finalized: false,
        }
    }

    /// Run until cancellation, the time ceiling, or an unrecoverable error.
    ///
    /// The cancellation flag is observed only at the top of each iteration,
    /// so one in-flight read/write pair may complete after cancellation is
    /// requested.
    pub fn run_loop(&mut self) -> StopReason {
        let started = self.clock.now();
        let reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            let elapsed = self.clock.now().duration_since(started);
            if elapsed >= self.cfg.max_duration {
                tracing::info!(
                    "Maximum recording time ({:.1}s) reached",
                    self.cfg.max_duration.as_secs_f64()
                );
                self.cancel.cancel();
                break StopReason::CeilingReached;
            }

            match self.link.read_line(self.cfg.poll_timeout) {
                Ok(Some(line)) => {
                    if !protocol::is_data_record(&line) {
                        continue;
                    }
                    if let Err(e) = self.sink.append(&line) {
                        tracing::error!("Sink write failed: {}", e);
                        break StopReason::SinkFailed(e);
                    }
                    let count = self.stats.samples.fetch_add(1, Ordering::Relaxed) + 1;
                    if count % self.cfg.progress_every == 0 {
                        let secs = self.clock.now().duration_since(started).as_secs_f64();
                        let rate = if secs > 0.0 { count as f64 / secs } else { 0.0 };
                        tracing::info!(
                            "Samples: {} | Time: {:.1}s | Rate: {:.1} Hz",
                            count,
                            secs,
                            rate
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Read error during capture: {}", e);
                    break StopReason::LinkFailed;
                }
            }
        };
        self.elapsed = self.clock.now().duration_since(started);
        reason
    }

    /// Stop the device and close the sink. Safe to call more than once;
    /// only the first call has any effect.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if handshake::stop(&mut self.link) == StopAck::Mismatch {
            tracing::warn!("STOP not acknowledged; finalizing locally anyway");
        }
        if let Err(e) = self.sink.close() {
            tracing::warn!("Failed to close sink: {}", e);
        }
    }

    /// Final statistics; meaningful once `run_loop` has returned.
    pub fn report(&self) -> SessionReport {
        SessionReport::new(self.stats.samples.load(Ordering::Relaxed), self.elapsed)
    }
}

impl<L: LineLink, S: RecordSink> Drop for CaptureEngine<L, S> {
    fn drop(&mut self) {
        // Abnormal exits still stop the device and close the sink
        self.finalize();
    }
}
