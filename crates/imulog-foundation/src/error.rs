use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No responsive device found on any candidate port")]
    NoDeviceFound,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("START not confirmed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Sink error: {0}")]
    Sink(#[source] std::io::Error),

    #[error("Invalid session state transition: {0}")]
    InvalidTransition(String),
}
