//! Request codes and info keys understood by the printer.

use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Offset added to most request codes to form the acknowledgement type.
pub const DEFAULT_RESPONSE_OFFSET: u8 = 16;

/// Frame type the printer sends when it rejects a command.
pub const ERROR_RESPONSE_TYPE: u8 = 0xDB;

/// Command identifiers sent to the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RequestCode {
    GetInfo = 0x40,
    GetRfid = 0x1A,
    Heartbeat = 0xDC,
    SetLabelType = 0x23,
    SetLabelDensity = 0x21,
    StartPrint = 0x01,
    EndPrint = 0xF3,
    StartPagePrint = 0x03,
    EndPagePrint = 0xE3,
    AllowPrintClear = 0x20,
    SetDimension = 0x13,
    SetQuantity = 0x15,
    GetPrintStatus = 0xA3,
    /// One packed bitmap row. Sent without waiting for a reply.
    PrintLineData = 0x85,
}

impl RequestCode {
    /// Returns the type byte written on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the frame type acknowledging this request for `offset`.
    ///
    /// The addition wraps, so `EndPrint` (0xF3) with the default offset
    /// expects 0x03.
    pub fn response_type(self, offset: u8) -> u8 {
        self.code().wrapping_add(offset)
    }

    /// Returns whether the printer replies to this request.
    pub fn expects_response(self) -> bool {
        !matches!(self, RequestCode::PrintLineData)
    }

    /// Returns the operation name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            RequestCode::GetInfo => "getInfo",
            RequestCode::GetRfid => "getRfid",
            RequestCode::Heartbeat => "heartbeat",
            RequestCode::SetLabelType => "setLabelType",
            RequestCode::SetLabelDensity => "setLabelDensity",
            RequestCode::StartPrint => "startPrint",
            RequestCode::EndPrint => "endPrint",
            RequestCode::StartPagePrint => "startPagePrint",
            RequestCode::EndPagePrint => "endPagePrint",
            RequestCode::AllowPrintClear => "allowPrintClear",
            RequestCode::SetDimension => "setDimension",
            RequestCode::SetQuantity => "setQuantity",
            RequestCode::GetPrintStatus => "getPrintStatus",
            RequestCode::PrintLineData => "printLineData",
        }
    }
}

impl TryFrom<u8> for RequestCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x40 => RequestCode::GetInfo,
            0x1A => RequestCode::GetRfid,
            0xDC => RequestCode::Heartbeat,
            0x23 => RequestCode::SetLabelType,
            0x21 => RequestCode::SetLabelDensity,
            0x01 => RequestCode::StartPrint,
            0xF3 => RequestCode::EndPrint,
            0x03 => RequestCode::StartPagePrint,
            0xE3 => RequestCode::EndPagePrint,
            0x20 => RequestCode::AllowPrintClear,
            0x13 => RequestCode::SetDimension,
            0x15 => RequestCode::SetQuantity,
            0xA3 => RequestCode::GetPrintStatus,
            0x85 => RequestCode::PrintLineData,
            other => return Err(other),
        })
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.code())
    }
}

/// Device properties readable through `getInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    LanguageType = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardVersion = 12,
}

impl InfoKey {
    /// Every key, in wire order.
    pub const ALL: [InfoKey; 10] = [
        InfoKey::Density,
        InfoKey::PrintSpeed,
        InfoKey::LabelType,
        InfoKey::LanguageType,
        InfoKey::AutoShutdownTime,
        InfoKey::DeviceType,
        InfoKey::SoftVersion,
        InfoKey::Battery,
        InfoKey::DeviceSerial,
        InfoKey::HardVersion,
    ];

    /// Returns the key byte sent as the `getInfo` payload.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Response offset for `getInfo` with this key.
    pub fn response_offset(self) -> u8 {
        self.code() + 1
    }

    /// Returns the snake_case name of the key.
    pub fn name(self) -> &'static str {
        match self {
            InfoKey::Density => "density",
            InfoKey::PrintSpeed => "print_speed",
            InfoKey::LabelType => "label_type",
            InfoKey::LanguageType => "language_type",
            InfoKey::AutoShutdownTime => "auto_shutdown_time",
            InfoKey::DeviceType => "device_type",
            InfoKey::SoftVersion => "soft_version",
            InfoKey::Battery => "battery",
            InfoKey::DeviceSerial => "device_serial",
            InfoKey::HardVersion => "hard_version",
        }
    }
}

impl fmt::Display for InfoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InfoKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        InfoKey::ALL
            .into_iter()
            .find(|key| key.name() == normalized)
            .ok_or_else(|| format!("unknown info key '{}'", s))
    }
}

/// A request frame together with the response type it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub code: RequestCode,
    pub payload: Bytes,
    pub response_offset: u8,
}

impl Request {
    /// Creates a request using the default response offset.
    pub fn new(code: RequestCode, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
            response_offset: DEFAULT_RESPONSE_OFFSET,
        }
    }

    /// Overrides the response offset.
    pub fn with_response_offset(mut self, offset: u8) -> Self {
        self.response_offset = offset;
        self
    }

    /// Frame type of the acknowledgement this request expects.
    pub fn response_type(&self) -> u8 {
        self.code.response_type(self.response_offset)
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(self.code.code(), self.payload.clone())
    }

    /// Encodes the request into its wire form.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        self.to_frame().encode()
    }

    // =========================================================================
    // Constructors for every request/response command
    // =========================================================================

    pub fn set_label_density(density: u8) -> Self {
        Self::new(RequestCode::SetLabelDensity, vec![density])
    }

    pub fn set_label_type(label_type: u8) -> Self {
        Self::new(RequestCode::SetLabelType, vec![label_type])
    }

    pub fn start_print() -> Self {
        Self::flag(RequestCode::StartPrint)
    }

    pub fn end_print() -> Self {
        Self::flag(RequestCode::EndPrint)
    }

    pub fn start_page_print() -> Self {
        Self::flag(RequestCode::StartPagePrint)
    }

    pub fn end_page_print() -> Self {
        Self::flag(RequestCode::EndPagePrint)
    }

    pub fn allow_print_clear() -> Self {
        Self::flag(RequestCode::AllowPrintClear)
    }

    /// Label size in pixels; width first on the wire.
    pub fn set_dimension(width: u16, height: u16) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u16(width);
        payload.put_u16(height);
        Self::new(RequestCode::SetDimension, payload.freeze())
    }

    pub fn set_quantity(quantity: u16) -> Self {
        Self::new(
            RequestCode::SetQuantity,
            Bytes::copy_from_slice(&quantity.to_be_bytes()),
        )
    }

    pub fn get_print_status() -> Self {
        Self::flag(RequestCode::GetPrintStatus)
    }

    /// `getInfo` is acknowledged with `0x40 + key + 1`.
    pub fn get_info(key: InfoKey) -> Self {
        Self::new(RequestCode::GetInfo, vec![key.code()])
            .with_response_offset(key.response_offset())
    }

    pub fn get_rfid() -> Self {
        Self::flag(RequestCode::GetRfid)
    }

    pub fn heartbeat() -> Self {
        Self::flag(RequestCode::Heartbeat)
    }

    fn flag(code: RequestCode) -> Self {
        Self::new(code, Bytes::from_static(&[1]))
    }
}
