//! Error types for the stage driver.
//!
//! `StageError` is the single error enum used by the codec, the protocol layer,
//! the transport helpers and the driver. It is built with `thiserror` so every
//! layer can propagate with `?`:
//!
//! - **`Range`**: a value does not fit the requested byte width (or an angle
//!   converts to more device units than an `i32` holds).
//! - **`Decode`** / **`InvalidLength`**: a byte sequence handed to a decoder is
//!   malformed or has the wrong length for the field being read.
//! - **`Io`**, **`Timeout`**, **`UnexpectedEof`**: transport failures. These are
//!   propagated unchanged; nothing in this crate retries.
//! - **`NotConnected`**: an operation was invoked before the port was opened.
//! - **`Config`** / **`Configuration`**: loading or validating configuration.
//!
//! The capability traits and the CLI work with `anyhow::Result`; a `StageError`
//! converts into `anyhow::Error` through the standard `?` machinery.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type StageResult<T> = std::result::Result<T, StageError>;

/// Errors raised by the codec, protocol layer, transport and driver.
#[derive(Error, Debug)]
pub enum StageError {
    /// Value outside the range of the target width
    #[error("Value {value} does not fit in {width} byte(s) of two's complement")]
    Range {
        /// Offending value, as text
        value: String,
        /// Target width in bytes
        width: usize,
    },

    /// Malformed byte sequence
    #[error("Decode error: {0}")]
    Decode(String),

    /// Byte sequence of the wrong length for the field
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Length received
        actual: usize,
    },

    /// Serial I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply incomplete when the deadline passed
    #[error("Timed out waiting for reply: received {received} of {expected} bytes")]
    Timeout {
        /// Reply length
        expected: usize,
        /// Bytes read before the deadline
        received: usize,
    },

    /// Port closed before the reply was complete
    #[error("Unexpected EOF from serial port: received {received} of {expected} bytes")]
    UnexpectedEof {
        /// Reply length
        expected: usize,
        /// Bytes read before the port closed
        received: usize,
    },

    /// Operation issued before `connect`
    #[error("Serial port not connected")]
    NotConnected,

    /// No enumerated port matches the configured identifier
    #[error("No serial port matches '{0}'")]
    DeviceNotFound(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Built without the `serial` feature
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,
}

impl StageError {
    /// Range error for `value` that does not fit `width` bytes.
    pub fn range(value: impl std::fmt::Display, width: usize) -> Self {
        StageError::Range {
            value: value.to_string(),
            width,
        }
    }

    /// Whether the error came from the transport rather than from the data.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StageError::Io(_) | StageError::Timeout { .. } | StageError::UnexpectedEof { .. }
        )
    }
}

impl From<figment::Error> for StageError {
    fn from(value: figment::Error) -> Self {
        StageError::Config(Box::new(value))
    }
}
