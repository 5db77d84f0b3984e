//! Engine error types.

use bytes::Bytes;
use niimbot_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced to callers of the printer engine.
#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("image processing failed: {0}")]
    ImageProcessingFailed(String),

    #[error("response timeout")]
    ResponseTimeout,

    #[error("failed to parse {operation}: {reason} ({})", hex::encode(.bytes))]
    ParsingFailed {
        operation: String,
        reason: String,
        bytes: Bytes,
    },

    #[error("disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrinterError {
    /// Builds a parse failure for `operation`.
    pub fn parsing(operation: impl Into<String>, reason: impl Into<String>, bytes: &[u8]) -> Self {
        PrinterError::ParsingFailed {
            operation: operation.into(),
            reason: reason.into(),
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    /// Returns whether this error is retryable.
    ///
    /// Only a missing reply is worth asking again for; everything else
    /// reflects a printer or link state that a retry will not change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PrinterError::ResponseTimeout)
    }
}

impl From<ProtocolError> for PrinterError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Image(reason) => PrinterError::ImageProcessingFailed(reason),
            ProtocolError::Parse {
                operation,
                reason,
                bytes,
            } => PrinterError::ParsingFailed {
                operation,
                reason,
                bytes,
            },
            ProtocolError::MalformedFrame { defect, bytes } => PrinterError::ParsingFailed {
                operation: "frame".to_string(),
                reason: defect.to_string(),
                bytes,
            },
            ProtocolError::PayloadTooLarge(len) => PrinterError::ParsingFailed {
                operation: "frame".to_string(),
                reason: format!("payload too large: {} bytes", len),
                bytes: Bytes::new(),
            },
        }
    }
}
