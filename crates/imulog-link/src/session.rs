use std::io;
use std::thread;

use crossbeam_channel::Receiver;
use imulog_foundation::{CancelFlag, SessionError, SessionState, SessionTracker, SharedClock};

use crate::capture::{CaptureConfig, CaptureEngine, StopReason};
use crate::handshake;
use crate::link::LineLink;
use crate::sink::RecordSink;
use crate::stats::SessionReport;

/// Run one recording session end to end.
///
/// Order matters: the START handshake runs before `make_sink`, so a failed
/// handshake leaves no partial file behind. Exactly two tasks are live
/// during capture: this thread runs the engine loop, and a detached watcher
/// maps a message on `cancel_rx` to the shared cancellation flag. The
/// watcher is best-effort; it exits when the sender is dropped and is never
/// joined.
pub fn run_session<L, S, F>(
    mut link: L,
    make_sink: F,
    cancel_rx: Receiver<()>,
    clock: SharedClock,
    cfg: CaptureConfig,
) -> Result<SessionReport, SessionError>
where
    L: LineLink,
    S: RecordSink,
    F: FnOnce() -> io::Result<S>,
{
    let tracker = SessionTracker::new();
    tracker.transition(SessionState::Starting)?;

    if let Err(e) = handshake::start(&mut link) {
        let _ = tracker.transition(SessionState::Failed {
            reason: e.to_string(),
        });
        return Err(e);
    }

    let sink = match make_sink() {
        Ok(sink) => sink,
        Err(e) => {
            // The device is already streaming; tell it to stop before bailing.
            // The link itself is released when it is dropped below.
            let _ = handshake::stop(&mut link);
            let _ = tracker.transition(SessionState::Failed {
                reason: e.to_string(),
            });
            return Err(SessionError::Sink(e));
        }
    };

    let cancel = CancelFlag::new();
    spawn_cancel_watcher(cancel_rx, cancel.clone());

    tracker.transition(SessionState::Recording)?;
    let mut engine = CaptureEngine::new(link, sink, cancel, clock, cfg);
    let reason = engine.run_loop();

    match reason {
        StopReason::SinkFailed(e) => {
            let _ = tracker.transition(SessionState::Failed {
                reason: e.to_string(),
            });
            engine.finalize();
            Err(SessionError::Sink(e))
        }
        reason => {
            tracing::info!("Capture stopped: {:?}", reason);
            tracker.transition(SessionState::Stopping)?;
            engine.finalize();
            let report = engine.report();
            tracker.transition(SessionState::Complete)?;
            tracing::info!("Recording completed: {}", report);
            Ok(report)
        }
    }
}

fn spawn_cancel_watcher(cancel_rx: Receiver<()>, cancel: CancelFlag) {
    let spawned = thread::Builder::new()
        .name("cancel-watcher".to_string())
        .spawn(move || {
            if cancel_rx.recv().is_ok() {
                tracing::info!("Cancellation requested by operator");
                cancel.cancel();
            }
            // Sender dropped without a signal: the session ended on its own
        });
    if let Err(e) = spawned {
        tracing::warn!("Failed to spawn cancel watcher: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySink, ScriptedLink};
    use imulog_foundation::TestClock;
    use std::sync::Arc;

    fn clock() -> SharedClock {
        Arc::new(TestClock::new())
    }

    #[test]
    fn handshake_failure_opens_no_sink() {
        let link = ScriptedLink::new(vec![]);
        let (_tx, rx) = crossbeam_channel::unbounded();
        let result = run_session(
            link,
            || -> io::Result<MemorySink> { unreachable!("sink must not be created") },
            rx,
            clock(),
            CaptureConfig::default(),
        );
        assert!(matches!(
            result,
            Err(SessionError::HandshakeFailed { attempts: 10 })
        ));
    }

    #[test]
    fn successful_session_reports_and_closes_once() {
        let link = ScriptedLink::new(vec![
            Some("STARTED".into()),
            Some("1,a".into()),
            Some("READY".into()),
            Some("2,b".into()),
        ])
        .failing_when_exhausted();
        let writes = link.writes_handle();
        let sink = MemorySink::new();
        let records = sink.records.clone();
        let closes = sink.closes.clone();
        let (_tx, rx) = crossbeam_channel::unbounded();

        let report = run_session(
            link,
            move || Ok(sink),
            rx,
            clock(),
            CaptureConfig::default(),
        )
        .unwrap();

        assert_eq!(report.samples, 2);
        assert_eq!(
            *records.lock().unwrap(),
            vec!["1,a".to_string(), "2,b".into()]
        );
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        let writes = writes.lock().unwrap();
        assert_eq!(writes.iter().filter(|w| *w == "STOP").count(), 1);
    }

    #[test]
    fn pending_cancellation_ends_session_cleanly() {
        let link = ScriptedLink::new(vec![Some("STARTED".into())]);
        let sink = MemorySink::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        // Operator cancels before any data arrives
        tx.send(()).unwrap();

        let report = run_session(
            link,
            move || Ok(sink),
            rx,
            clock(),
            CaptureConfig::default(),
        )
        .unwrap();

        assert_eq!(report.samples, 0);
        // Zero elapsed must not produce a NaN or panic
        assert_eq!(report.rate_hz, 0.0);
    }

    #[test]
    fn sink_creation_failure_still_stops_device() {
        let link = ScriptedLink::new(vec![Some("STARTED".into())]);
        let writes = link.writes_handle();
        let (_tx, rx) = crossbeam_channel::unbounded();

        let result = run_session(
            link,
            || -> io::Result<MemorySink> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            },
            rx,
            clock(),
            CaptureConfig::default(),
        );

        assert!(matches!(result, Err(SessionError::Sink(_))));
        assert!(writes.lock().unwrap().contains(&"STOP".to_string()));
    }
}
