use std::io::{Read, Write};
use std::time::{Duration, Instant};

use imulog_foundation::LinkError;

use crate::protocol;

/// Line-framed duplex channel to the device.
///
/// The trait is the seam between the protocol layers and the physical
/// transport; tests drive the handshake and capture engine through scripted
/// implementations.
pub trait LineLink: Send {
    /// Read one line, waiting up to `timeout` for it to complete.
    ///
    /// Returns `Ok(None)` when no full line arrived in time; any bytes of a
    /// partial line are retained for the next call. Trailing CR/LF is
    /// stripped.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError>;

    /// Write `line` followed by a newline and flush.
    fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Discard any buffered inbound bytes, including a partial line.
    fn clear_input(&mut self) -> Result<(), LinkError>;
}

/// `LineLink` over a real serial port.
///
/// Owned exclusively by one session; the port is released when the link is
/// dropped.
pub struct SerialLine {
    port: Box<dyn serialport::SerialPort>,
    pending: Vec<u8>,
    path: String,
}

impl SerialLine {
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud).timeout(timeout).open()?;
        Ok(Self {
            port,
            pending: Vec::new(),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl LineLink for SerialLine {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];
        loop {
            if let Some(line) = take_line(&mut self.pending) {
                return Ok(Some(line));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // Bound the blocking read by the time left in this poll
            self.port.set_timeout(deadline - now)?;
            match self.port.read(&mut buf) {
                Ok(0) => return Err(LinkError::Disconnected),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(LinkError::Io(e)),
            }
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.pending.clear();
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}

/// Split the first complete line out of `pending`, stripping CR/LF.
/// Non-UTF-8 bytes are replaced rather than dropped; the payload is opaque.
fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let pos = pending.iter().position(|&b| b == b'\n')?;
    let rest = pending.split_off(pos + 1);
    let mut raw = std::mem::replace(pending, rest);
    raw.truncate(pos);
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    Some(String::from_utf8_lossy(&raw).into_owned())
}

/// Convenience used by discovery and the session front end: open with the
/// protocol's fixed connection parameters.
pub fn open_default(path: &str) -> Result<SerialLine, LinkError> {
    SerialLine::open(path, protocol::BAUD_RATE, protocol::READ_TIMEOUT)
}
