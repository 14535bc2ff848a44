//! Common error types for pcmout
//!
//! Every fault the playback core can report is a variant of [`Error`].
//! [`ErrorKind`] is the payload-free discriminant carried by
//! `PlaybackEvent::Error` so observers can match on the fault class.

use serde::Serialize;
use thiserror::Error;

/// Common result type for pcmout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the playback core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unsupported channels/bit depth/sample rate combination
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Output device could not be acquired at open time
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Operation on a session that is draining, closed or failed
    #[error("Session is not open")]
    NotOpen,

    /// Write payload is not a whole number of frames
    #[error("Frame misaligned: {len} bytes is not a multiple of {bytes_per_frame} bytes per frame")]
    FrameMisaligned { len: usize, bytes_per_frame: usize },

    /// Producer could not enqueue within the configured bound
    #[error("Backpressure timeout: {written} of {requested} bytes enqueued before {timeout_ms}ms without progress")]
    BackpressureTimeout {
        written: usize,
        requested: usize,
        timeout_ms: u64,
    },

    /// Consumer-side delivery failure
    #[error("Device I/O error: {0}")]
    DeviceIo(String),

    /// Shutdown timeout exceeded with undelivered data
    #[error("Forced close: {undelivered_bytes} bytes were not delivered")]
    ForcedClose { undelivered_bytes: usize },

    /// Wait aborted by a concurrent close
    #[error("Cancelled by concurrent close")]
    Cancelled,

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Fault class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Error::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Error::NotOpen => ErrorKind::NotOpen,
            Error::FrameMisaligned { .. } => ErrorKind::FrameMisaligned,
            Error::BackpressureTimeout { .. } => ErrorKind::BackpressureTimeout,
            Error::DeviceIo(_) => ErrorKind::DeviceIo,
            Error::ForcedClose { .. } => ErrorKind::ForcedClose,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

/// Payload-free discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFormat,
    DeviceUnavailable,
    NotOpen,
    FrameMisaligned,
    BackpressureTimeout,
    DeviceIo,
    ForcedClose,
    Cancelled,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidFormat => "InvalidFormat",
            ErrorKind::DeviceUnavailable => "DeviceUnavailable",
            ErrorKind::NotOpen => "NotOpen",
            ErrorKind::FrameMisaligned => "FrameMisaligned",
            ErrorKind::BackpressureTimeout => "BackpressureTimeout",
            ErrorKind::DeviceIo => "DeviceIOError",
            ErrorKind::ForcedClose => "ForcedClose",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Config => "Config",
        };
        f.write_str(name)
    }
}
