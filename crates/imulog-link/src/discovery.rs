use imulog_foundation::{Clock, LinkError, RealClock};
use serialport::{SerialPortInfo, SerialPortType};

use crate::link::{open_default, LineLink, SerialLine};
use crate::protocol;

/// Description keywords that mark a port as a likely device.
const DEVICE_KEYWORDS: &[&str] = &["arduino", "nano", "usb serial"];

/// Platform device-path patterns for boards that enumerate without useful
/// USB metadata (Linux CDC-ACM, macOS usbmodem).
const PATH_PATTERNS: &[&str] = &["ttyACM", "cu.usbmodem"];

/// Find the device: enumerate candidate ports, probe each in order, return
/// the first link that answers like our firmware.
pub fn discover() -> Result<SerialLine, LinkError> {
    tracing::info!("Scanning serial ports for device...");
    let ports = serialport::available_ports()?;
    let candidates: Vec<String> = ports
        .iter()
        .filter(|p| is_candidate(&p.port_name, &describe(p)))
        .map(|p| p.port_name.clone())
        .collect();

    if candidates.is_empty() {
        tracing::warn!("No candidate serial ports found ({} ports total)", ports.len());
        return Err(LinkError::NoDeviceFound);
    }

    let clock = RealClock::new();
    for path in candidates {
        tracing::info!("Trying {}...", path);
        match try_port(&path, &clock) {
            Ok(Some(link)) => {
                tracing::info!("Device connected on {}", path);
                return Ok(link);
            }
            Ok(None) => tracing::warn!("No response from {}", path),
            Err(e) => tracing::warn!("Failed to open {}: {}", path, e),
        }
    }

    tracing::warn!("No device found with matching firmware");
    Err(LinkError::NoDeviceFound)
}

fn try_port(path: &str, clock: &dyn Clock) -> Result<Option<SerialLine>, LinkError> {
    let mut link = open_default(path)?;
    if probe(&mut link, clock)? {
        Ok(Some(link))
    } else {
        Ok(None)
    }
}

/// Liveness probe: settle, flush stale input, send `TEST`, then poll for a
/// reply that is a control token or carries the firmware marker.
pub(crate) fn probe<L: LineLink + ?Sized>(
    link: &mut L,
    clock: &dyn Clock,
) -> Result<bool, LinkError> {
    // The board resets on open; give it time to boot
    clock.sleep(protocol::SETTLE_DELAY);
    link.clear_input()?;
    link.write_line(protocol::CMD_TEST)?;

    for _ in 0..protocol::PROBE_ATTEMPTS {
        match link.read_line(protocol::PROBE_INTERVAL)? {
            Some(line)
                if protocol::is_control_token(&line)
                    || line.contains(protocol::DEVICE_MARKER) =>
            {
                tracing::debug!("Probe reply: '{}'", line);
                return Ok(true);
            }
            Some(line) => tracing::debug!("Unrecognized probe reply: '{}'", line),
            None => {}
        }
    }
    Ok(false)
}

/// Candidate filter over port metadata; pure so it is testable without
/// hardware attached.
pub(crate) fn is_candidate(path: &str, description: &str) -> bool {
    let description = description.to_lowercase();
    if DEVICE_KEYWORDS.iter().any(|k| description.contains(k)) {
        return true;
    }
    PATH_PATTERNS.iter().any(|p| path.contains(p))
}

fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut parts = Vec::new();
            if let Some(m) = &usb.manufacturer {
                parts.push(m.as_str());
            }
            if let Some(p) = &usb.product {
                parts.push(p.as_str());
            }
            parts.join(" ")
        }
        _ => String::new(),
    }
}
