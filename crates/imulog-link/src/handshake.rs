use imulog_foundation::SessionError;

use crate::link::LineLink;
use crate::protocol;

/// START handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartState {
    AwaitingAck,
    Confirmed,
    Exhausted,
}

/// Outcome of the STOP exchange. `Mismatch` is a soft failure: local
/// shutdown takes priority over protocol confirmation, so the session
/// finalizes either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAck {
    Confirmed,
    Mismatch,
}

/// Drive the START exchange until the device confirms or the attempt bound
/// is exhausted.
///
/// The device may re-announce `READY` if our probe raced its boot banner;
/// that and silence both mean "send START again". Unknown tokens are logged
/// and do not trigger a resend.
pub fn start<L: LineLink + ?Sized>(link: &mut L) -> Result<(), SessionError> {
    link.clear_input().map_err(SessionError::Link)?;
    link.write_line(protocol::CMD_START)
        .map_err(SessionError::Link)?;

    let mut state = StartState::AwaitingAck;
    for attempt in 1..=protocol::HANDSHAKE_ATTEMPTS {
        match link
            .read_line(protocol::HANDSHAKE_INTERVAL)
            .map_err(SessionError::Link)?
        {
            Some(line) if line == protocol::TOKEN_STARTED => {
                state = StartState::Confirmed;
                break;
            }
            Some(line) if line == protocol::TOKEN_READY => {
                tracing::debug!("Device re-announced READY, resending START");
                link.write_line(protocol::CMD_START)
                    .map_err(SessionError::Link)?;
            }
            // A blank line and a timeout look the same to the device:
            // no answer to our command, so ask again
            Some(line) if line.is_empty() => {
                tracing::debug!("Blank line for START ack (attempt {}), resending", attempt);
                link.write_line(protocol::CMD_START)
                    .map_err(SessionError::Link)?;
            }
            None => {
                tracing::debug!("No START ack (attempt {}), resending", attempt);
                link.write_line(protocol::CMD_START)
                    .map_err(SessionError::Link)?;
            }
            Some(line) => {
                tracing::warn!("Unexpected token during START: '{}'", line);
            }
        }
    }
    if state == StartState::AwaitingAck {
        state = StartState::Exhausted;
    }

    match state {
        StartState::Confirmed => {
            tracing::info!("Device confirmed START");
            Ok(())
        }
        StartState::AwaitingAck | StartState::Exhausted => Err(SessionError::HandshakeFailed {
            attempts: protocol::HANDSHAKE_ATTEMPTS,
        }),
    }
}

/// Send STOP once and read one reply at the link's configured timeout.
pub fn stop<L: LineLink + ?Sized>(link: &mut L) -> StopAck {
    if let Err(e) = link.write_line(protocol::CMD_STOP) {
        tracing::warn!("Failed to send STOP: {}", e);
        return StopAck::Mismatch;
    }
    match link.read_line(protocol::READ_TIMEOUT) {
        Ok(Some(line)) if line == protocol::TOKEN_STOPPED => {
            tracing::info!("Device confirmed STOP");
            StopAck::Confirmed
        }
        Ok(Some(line)) => {
            tracing::warn!("Unexpected STOP reply: '{}'", line);
            StopAck::Mismatch
        }
        Ok(None) => {
            tracing::warn!("No STOP acknowledgment within timeout");
            StopAck::Mismatch
        }
        Err(e) => {
            tracing::warn!("Read error awaiting STOP ack: {}", e);
            StopAck::Mismatch
        }
    }
}
