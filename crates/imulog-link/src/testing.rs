//! Scripted link and in-memory sink used across the protocol tests.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use imulog_foundation::{CancelFlag, LinkError, TestClock};

use crate::link::LineLink;
use crate::sink::RecordSink;

/// `LineLink` driven by a fixed script of replies. `None` entries model a
/// read timeout. Once the script is exhausted, reads either keep timing out
/// (default) or fail, depending on `failing_when_exhausted`.
pub(crate) struct ScriptedLink {
    responses: VecDeque<Option<String>>,
    writes: Arc<Mutex<Vec<String>>>,
    pub clears: usize,
    pub reads: usize,
    clock: Option<Arc<TestClock>>,
    cancel_on_read: Option<(usize, CancelFlag)>,
    fail_when_exhausted: bool,
}

impl ScriptedLink {
    pub fn new(responses: Vec<Option<String>>) -> Self {
        Self {
            responses: responses.into(),
            writes: Arc::new(Mutex::new(Vec::new())),
            clears: 0,
            reads: 0,
            clock: None,
            cancel_on_read: None,
            fail_when_exhausted: false,
        }
    }

    /// Advance this virtual clock by the read timeout on every poll, so
    /// wall-clock ceilings elapse deterministically.
    pub fn with_clock(mut self, clock: Arc<TestClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Raise `flag` during the `n`th read, simulating an operator cancelling
    /// while a read is in flight.
    pub fn cancel_on_read(mut self, n: usize, flag: CancelFlag) -> Self {
        self.cancel_on_read = Some((n, flag));
        self
    }

    pub fn failing_when_exhausted(mut self) -> Self {
        self.fail_when_exhausted = true;
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.writes)
    }
}

impl LineLink for ScriptedLink {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        self.reads += 1;
        if let Some(clock) = &self.clock {
            clock.advance(timeout);
        }
        if let Some((n, flag)) = &self.cancel_on_read {
            if self.reads == *n {
                flag.cancel();
            }
        }
        match self.responses.pop_front() {
            Some(reply) => Ok(reply),
            None if self.fail_when_exhausted => Err(LinkError::Disconnected),
            None => Ok(None),
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.writes.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.clears += 1;
        Ok(())
    }
}

/// `RecordSink` collecting records in memory, with handles that survive the
/// engine taking ownership.
#[derive(Clone)]
pub(crate) struct MemorySink {
    pub records: Arc<Mutex<Vec<String>>>,
    pub closes: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
    fail_after: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
            open: Arc::new(AtomicBool::new(true)),
            fail_after: Arc::new(AtomicU64::new(u64::MAX)),
        }
    }

    /// Fail every append once `n` records have been accepted.
    pub fn fail_appends_after(&self, n: u64) {
        self.fail_after.store(n, Ordering::SeqCst);
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &str) -> io::Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sink is closed"));
        }
        let mut records = self.records.lock().unwrap();
        if records.len() as u64 >= self.fail_after.load(Ordering::SeqCst) {
            return Err(io::Error::other("simulated write failure"));
        }
        records.push(record.to_string());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
