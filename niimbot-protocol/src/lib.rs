//! # niimbot-protocol
//!
//! Wire protocol for NIIMBOT thermal label printers.
//!
//! This crate provides:
//! - Binary framing with XOR checksum validation
//! - Reassembly of frames from an unframed byte stream
//! - Request codes, info keys and request payload builders
//! - Strict decoders for every acknowledgement payload
//! - Rasterisation of monochrome images into line upload frames

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod raster;
pub mod response;

pub use codec::FrameAssembler;
pub use command::{InfoKey, Request, RequestCode, DEFAULT_RESPONSE_OFFSET, ERROR_RESPONSE_TYPE};
pub use error::{FrameDefect, ProtocolError};
pub use frame::{checksum, Frame, FOOTER, HEADER};
pub use raster::{
    encode_image, render_preview, Inverted, MonoBitmap, PixelSource, RgbaSource, Rotated,
    Threshold,
};
pub use response::{Heartbeat, InfoValue, PrintStatus, RfidTag};

/// Bytes surrounding the payload: header, type, length, checksum, footer.
pub const FRAME_ENVELOPE_SIZE: usize = 7;

/// Maximum frame payload size; the length field is one byte.
pub const MAX_PAYLOAD_SIZE: usize = 255;
