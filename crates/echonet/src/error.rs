//! Error types for the ECHONET Lite engine.

use crate::key::{ClassCode, InstanceKey};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by construction paths and the command API.
///
/// The reactor itself never returns these to callers; runtime problems are
/// logged and the loop keeps going.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown device class {0}")]
    UnknownClass(ClassCode),

    #[error("Unknown property 0x{code:02X} for class {class}")]
    UnknownProperty { class: ClassCode, code: u8 },

    #[error("Unknown channel '{channel}' for device {key}")]
    UnknownChannel { key: InstanceKey, channel: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command mailbox is full")]
    MailboxFull,

    #[error("Engine has stopped")]
    EngineStopped,
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Structural problems with an inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("unexpected header 0x{0:02X}{1:02X}")]
    BadHeader(u8, u8),

    #[error("property {index} of {count} is truncated")]
    Truncated { index: usize, count: usize },
}

/// Failures converting between payload bytes and domain values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("expected {expected} payload bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("unrecognised payload byte 0x{0:02X}")]
    UnknownByte(u8),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("state {0} cannot be encoded by this property")]
    TypeMismatch(String),
}
