pub mod capture;
pub mod discovery;
pub mod handshake;
pub mod link;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{CaptureConfig, CaptureEngine, StopReason};
pub use discovery::discover;
pub use handshake::{StartState, StopAck};
pub use link::{LineLink, SerialLine};
pub use session::run_session;
pub use sink::{CsvSink, RecordSink};
pub use stats::{CaptureStats, SessionReport};
