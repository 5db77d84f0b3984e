//! Decoders turning acknowledgement payloads into typed results.
//!
//! Every decoder checks the payload length before reading and reports a
//! [`ProtocolError::Parse`] naming the operation, the reason and the raw
//! bytes. Nothing is truncated or zero-filled.

use crate::command::InfoKey;
use crate::error::ProtocolError;
use serde::Serialize;

/// Print progress reported by `getPrintStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrintStatus {
    /// Pages printed so far in the current job.
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

/// A decoded `getInfo` value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InfoValue {
    /// Plain signed integer (battery, density, device type, ...).
    Number(i32),
    /// Firmware or hardware version, already divided by 100.
    Version(f64),
    /// Device serial as lowercase hex.
    Serial(String),
}

impl std::fmt::Display for InfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfoValue::Number(n) => write!(f, "{}", n),
            InfoValue::Version(v) => write!(f, "{:.2}", v),
            InfoValue::Serial(s) => f.write_str(s),
        }
    }
}

/// Contents of the RFID tag on the loaded label roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RfidTag {
    /// 8-byte tag identifier as lowercase hex.
    pub uuid: String,
    pub barcode: String,
    pub serial: String,
    /// Total labels on the roll.
    pub total_len: u16,
    /// Labels already consumed.
    pub used_len: u16,
    #[serde(rename = "type")]
    pub tag_type: u8,
}

/// Status fields reported by `heartbeat`.
///
/// Which fields are present depends on the payload length the model sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

/// Decodes the one-byte acknowledgement shared by the setter and print
/// control commands.
pub fn decode_ack(operation: &str, payload: &[u8]) -> Result<bool, ProtocolError> {
    match payload.first() {
        Some(&flag) => Ok(flag != 0),
        None => Err(ProtocolError::parse(operation, "empty payload", payload)),
    }
}

/// Decodes a `getPrintStatus` reply.
pub fn decode_print_status(payload: &[u8]) -> Result<PrintStatus, ProtocolError> {
    require_len("getPrintStatus", payload, 4)?;
    Ok(PrintStatus {
        page: u16::from_be_bytes([payload[0], payload[1]]),
        progress1: payload[2],
        progress2: payload[3],
    })
}

/// Decodes a `getInfo` reply for `key`.
pub fn decode_info(key: InfoKey, payload: &[u8]) -> Result<InfoValue, ProtocolError> {
    let operation = format!("getInfo({})", key);
    match key {
        InfoKey::DeviceSerial => {
            if payload.is_empty() {
                return Err(ProtocolError::parse(operation, "empty serial", payload));
            }
            Ok(InfoValue::Serial(hex::encode(payload)))
        }
        InfoKey::SoftVersion | InfoKey::HardVersion => {
            require_len(&operation, payload, 4)?;
            Ok(InfoValue::Version(read_i32(payload) as f64 / 100.0))
        }
        _ => {
            require_len(&operation, payload, 4)?;
            Ok(InfoValue::Number(read_i32(payload)))
        }
    }
}

/// Decodes a `getRfid` reply. `Ok(None)` means no tag is present.
pub fn decode_rfid(payload: &[u8]) -> Result<Option<RfidTag>, ProtocolError> {
    const OP: &str = "getRfid";

    match payload.first() {
        None => return Err(ProtocolError::parse(OP, "empty payload", payload)),
        Some(0) => return Ok(None),
        Some(_) => {}
    }

    let mut reader = PayloadReader::new(OP, payload);
    let uuid = hex::encode(reader.take("uuid", 8)?);
    let barcode_len = reader.u8("barcode length")? as usize;
    let barcode = reader.utf8("barcode", barcode_len)?;
    let serial_len = reader.u8("serial length")? as usize;
    let serial = reader.utf8("serial", serial_len)?;
    let total_len = reader.u16("total length")?;
    let used_len = reader.u16("used length")?;
    let tag_type = reader.u8("type")?;

    Ok(Some(RfidTag {
        uuid,
        barcode,
        serial,
        total_len,
        used_len,
        tag_type,
    }))
}

/// Decodes a `heartbeat` reply.
///
/// The field layout is chosen by the total payload length. For 10-byte
/// payloads `closing_state` and `rfid_read_state` both come from byte 8;
/// which of the two the firmware actually means there is unconfirmed.
pub fn decode_heartbeat(payload: &[u8]) -> Result<Heartbeat, ProtocolError> {
    const OP: &str = "heartbeat";
    require_len(OP, payload, 9)?;

    let at = |i: usize| Some(payload[i]);
    let heartbeat = match payload.len() {
        20 => Heartbeat {
            paper_state: at(18),
            rfid_read_state: at(19),
            ..Default::default()
        },
        19 => Heartbeat {
            closing_state: at(15),
            power_level: at(16),
            paper_state: at(17),
            rfid_read_state: at(18),
        },
        13 => Heartbeat {
            closing_state: at(9),
            power_level: at(10),
            paper_state: at(11),
            rfid_read_state: at(12),
        },
        10 => Heartbeat {
            closing_state: at(8),
            power_level: at(9),
            rfid_read_state: at(8),
            ..Default::default()
        },
        9 => Heartbeat {
            closing_state: at(8),
            ..Default::default()
        },
        n => {
            return Err(ProtocolError::parse(
                OP,
                format!("unexpected payload length {}", n),
                payload,
            ))
        }
    };
    Ok(heartbeat)
}

fn require_len(operation: &str, payload: &[u8], min: usize) -> Result<(), ProtocolError> {
    if payload.len() < min {
        return Err(ProtocolError::parse(
            operation,
            format!("expected at least {} bytes, got {}", min, payload.len()),
            payload,
        ));
    }
    Ok(())
}

fn read_i32(payload: &[u8]) -> i32 {
    i32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
}

/// Sequential, bounds-checked reader over a reply payload.
struct PayloadReader<'a> {
    operation: &'a str,
    payload: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(operation: &'a str, payload: &'a [u8]) -> Self {
        Self {
            operation,
            payload,
            pos: 0,
        }
    }

    fn take(&mut self, field: &str, len: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.payload.len() - self.pos;
        if remaining < len {
            return Err(ProtocolError::parse(
                self.operation,
                format!(
                    "{}: expected {} bytes, only {} available",
                    field, len, remaining
                ),
                self.payload,
            ));
        }
        let slice = &self.payload[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self, field: &str) -> Result<u8, ProtocolError> {
        Ok(self.take(field, 1)?[0])
    }

    fn u16(&mut self, field: &str) -> Result<u16, ProtocolError> {
        let bytes = self.take(field, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn utf8(&mut self, field: &str, len: usize) -> Result<String, ProtocolError> {
        let bytes = self.take(field, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            ProtocolError::parse(
                self.operation,
                format!("{}: invalid UTF-8", field),
                self.payload,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfid_payload() -> Vec<u8> {
        let mut p = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        p.push(4);
        p.extend_from_slice(b"6972");
        p.push(3);
        p.extend_from_slice(b"A01");
        p.extend_from_slice(&[0x00, 0xC8]); // total 200
        p.extend_from_slice(&[0x00, 0x0A]); // used 10
        p.push(1);
        p
    }

    #[test]
    fn test_decode_ack() {
        assert!(decode_ack("setLabelDensity", &[1]).unwrap());
        assert!(!decode_ack("setLabelDensity", &[0, 5]).unwrap());

        let err = decode_ack("startPrint", &[]).unwrap_err();
        match err {
            ProtocolError::Parse { operation, .. } => assert_eq!(operation, "startPrint"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_decode_print_status() {
        let status = decode_print_status(&[0x01, 0x02, 0x30, 0x40]).unwrap();
        assert_eq!(status.page, 0x0102);
        assert_eq!(status.progress1, 0x30);
        assert_eq!(status.progress2, 0x40);

        assert!(decode_print_status(&[0x00, 0x01, 0x02]).is_err());
    }

    #[test]
    fn test_decode_info_number() {
        let value = decode_info(InfoKey::Battery, &[0x00, 0x00, 0x00, 0x55]).unwrap();
        assert_eq!(value, InfoValue::Number(85));

        let value = decode_info(InfoKey::DeviceType, &[0xFF, 0xFF, 0xFF, 0xFE]).unwrap();
        assert_eq!(value, InfoValue::Number(-2));
    }

    #[test]
    fn test_decode_info_version() {
        let value = decode_info(InfoKey::SoftVersion, &[0x00, 0x00, 0x01, 0x0A]).unwrap();
        assert_eq!(value, InfoValue::Version(2.66));
        assert_eq!(value.to_string(), "2.66");
    }

    #[test]
    fn test_decode_info_serial() {
        let value = decode_info(InfoKey::DeviceSerial, &[0xDE, 0xAD, 0x01]).unwrap();
        assert_eq!(value, InfoValue::Serial("dead01".to_string()));

        assert!(decode_info(InfoKey::DeviceSerial, &[]).is_err());
    }

    #[test]
    fn test_decode_info_short_payload() {
        let err = decode_info(InfoKey::HardVersion, &[0x00, 0x01]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("getInfo(hard_version)"));
        assert!(msg.contains("at least 4"));
    }

    #[test]
    fn test_decode_rfid() {
        let tag = decode_rfid(&rfid_payload()).unwrap().unwrap();
        assert_eq!(tag.uuid, "1122334455667788");
        assert_eq!(tag.barcode, "6972");
        assert_eq!(tag.serial, "A01");
        assert_eq!(tag.total_len, 200);
        assert_eq!(tag.used_len, 10);
        assert_eq!(tag.tag_type, 1);
    }

    #[test]
    fn test_decode_rfid_no_tag() {
        assert_eq!(decode_rfid(&[0x00]).unwrap(), None);
        assert!(decode_rfid(&[]).is_err());
    }

    #[test]
    fn test_decode_rfid_truncated() {
        let payload = rfid_payload();
        // Every strict prefix that still starts with a non-zero byte must fail
        for len in 1..payload.len() {
            let result = decode_rfid(&payload[..len]);
            assert!(result.is_err(), "prefix of {} bytes decoded", len);
        }

        let err = decode_rfid(&payload[..10]).unwrap_err();
        assert!(err.to_string().contains("barcode"));
    }

    #[test]
    fn test_decode_rfid_invalid_utf8() {
        let mut payload = rfid_payload();
        payload[9] = 0xFF;
        let err = decode_rfid(&payload).unwrap_err();
        assert!(err.to_string().contains("invalid UTF-8"));
    }

    #[test]
    fn test_decode_heartbeat_layouts() {
        let mut p = vec![0u8; 20];
        p[18] = 1;
        p[19] = 2;
        let hb = decode_heartbeat(&p).unwrap();
        assert_eq!(hb.paper_state, Some(1));
        assert_eq!(hb.rfid_read_state, Some(2));
        assert_eq!(hb.closing_state, None);

        let p: Vec<u8> = (0..19).collect();
        let hb = decode_heartbeat(&p).unwrap();
        assert_eq!(hb.closing_state, Some(15));
        assert_eq!(hb.power_level, Some(16));
        assert_eq!(hb.paper_state, Some(17));
        assert_eq!(hb.rfid_read_state, Some(18));

        let p: Vec<u8> = (0..13).collect();
        let hb = decode_heartbeat(&p).unwrap();
        assert_eq!(hb.closing_state, Some(9));
        assert_eq!(hb.power_level, Some(10));
        assert_eq!(hb.paper_state, Some(11));
        assert_eq!(hb.rfid_read_state, Some(12));

        let p: Vec<u8> = (0..9).collect();
        let hb = decode_heartbeat(&p).unwrap();
        assert_eq!(hb.closing_state, Some(8));
        assert_eq!(hb.power_level, None);
    }

    #[test]
    fn test_decode_heartbeat_length_ten_shares_byte() {
        let p: Vec<u8> = (0..10).collect();
        let hb = decode_heartbeat(&p).unwrap();
        assert_eq!(hb.closing_state, Some(8));
        assert_eq!(hb.rfid_read_state, Some(8));
        assert_eq!(hb.power_level, Some(9));
        assert_eq!(hb.paper_state, None);
    }

    #[test]
    fn test_decode_heartbeat_rejects_unknown_lengths() {
        assert!(decode_heartbeat(&[0u8; 8]).is_err());
        let err = decode_heartbeat(&[0u8; 11]).unwrap_err();
        assert!(err.to_string().contains("unexpected payload length 11"));
    }

    #[test]
    fn test_info_value_serialization() {
        let json = serde_json::to_string(&InfoValue::Number(85)).unwrap();
        assert_eq!(json, "85");
        let json = serde_json::to_string(&InfoValue::Serial("ab".into())).unwrap();
        assert_eq!(json, "\"ab\"");
    }
}
