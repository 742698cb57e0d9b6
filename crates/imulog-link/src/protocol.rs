//! Wire protocol tokens and connection constants.
//!
//! The device speaks newline-terminated ASCII. Reserved tokens are never
//! data; any other non-empty line is one opaque sensor record forwarded
//! verbatim to the sink.

use std::time::Duration;

pub const TOKEN_READY: &str = "READY";
pub const TOKEN_STARTED: &str = "STARTED";
pub const TOKEN_STOPPED: &str = "STOPPED";

pub const CMD_TEST: &str = "TEST";
pub const CMD_START: &str = "START";
pub const CMD_STOP: &str = "STOP";

/// Substring that identifies our firmware in a free-form probe reply.
pub const DEVICE_MARKER: &str = "IMU";

pub const BAUD_RATE: u32 = 115_200;
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

pub const PROBE_ATTEMPTS: u32 = 10;
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);

pub const HANDSHAKE_ATTEMPTS: u32 = 10;
pub const HANDSHAKE_INTERVAL: Duration = Duration::from_millis(500);

pub const MAX_CAPTURE: Duration = Duration::from_secs(120);
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);
pub const PROGRESS_INTERVAL: u64 = 100;

pub const CSV_HEADER: &str = "Timestamp,AccelX,AccelY,AccelZ,GyroX,GyroY,GyroZ";

pub fn is_control_token(line: &str) -> bool {
    matches!(line, TOKEN_READY | TOKEN_STARTED | TOKEN_STOPPED)
}

/// A data record is any non-empty line that is not a reserved token.
pub fn is_data_record(line: &str) -> bool {
    !line.is_empty() && !is_control_token(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_tokens_are_not_data() {
        for token in [TOKEN_READY, TOKEN_STARTED, TOKEN_STOPPED] {
            assert!(is_control_token(token));
            assert!(!is_data_record(token));
        }
    }

    #[test]
    fn empty_line_is_noise() {
        assert!(!is_control_token(""));
        assert!(!is_data_record(""));
    }

    #[test]
    fn payload_lines_are_data() {
        assert!(is_data_record("1234,0.01,-0.02,0.98,0.1,0.2,0.3"));
        // Tokens embedded in a longer line do not make it control
        assert!(is_data_record("READY,1,2,3"));
        assert!(is_data_record("ready"));
    }
}
