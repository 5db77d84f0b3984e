//! Protocol error types.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during framing, response decoding,
/// or image encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame ({defect}): {}", hex::encode(.bytes))]
    MalformedFrame { defect: FrameDefect, bytes: Bytes },

    #[error("payload too large: {0} bytes (max {})", crate::MAX_PAYLOAD_SIZE)]
    PayloadTooLarge(usize),

    #[error("failed to parse {operation} response: {reason} ({})", hex::encode(.bytes))]
    Parse {
        operation: String,
        reason: String,
        bytes: Bytes,
    },

    #[error("image not encodable: {0}")]
    Image(String),
}

impl ProtocolError {
    /// Builds a response parse error for `operation`.
    pub fn parse(operation: impl Into<String>, reason: impl Into<String>, bytes: &[u8]) -> Self {
        ProtocolError::Parse {
            operation: operation.into(),
            reason: reason.into(),
            bytes: Bytes::copy_from_slice(bytes),
        }
    }
}

/// The structural check a frame failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDefect {
    /// Fewer bytes than the fixed 7-byte envelope.
    TooShort(usize),
    /// First two bytes were not `55 55`.
    InvalidHeader([u8; 2]),
    /// Last two bytes were not `AA AA`.
    InvalidFooter([u8; 2]),
    /// Declared payload length does not account for the frame size.
    LengthMismatch { declared: usize, actual: usize },
    /// XOR checksum did not match.
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl fmt::Display for FrameDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDefect::TooShort(len) => write!(
                f,
                "too short: {} bytes (min {})",
                len,
                crate::FRAME_ENVELOPE_SIZE
            ),
            FrameDefect::InvalidHeader(h) => {
                write!(f, "invalid header {:02x}{:02x}", h[0], h[1])
            }
            FrameDefect::InvalidFooter(t) => {
                write!(f, "invalid footer {:02x}{:02x}", t[0], t[1])
            }
            FrameDefect::LengthMismatch { declared, actual } => write!(
                f,
                "length mismatch: declared {} byte payload, frame holds {}",
                declared, actual
            ),
            FrameDefect::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:#04x}, got {:#04x}",
                expected, actual
            ),
        }
    }
}
