//! Binary frame format for the NIIMBOT protocol.
//!
//! Frame layout (7 bytes envelope + payload):
//!
//! ```text
//! +---------+------+-----+-------------+----------+---------+
//! | header  | type | len | payload     | checksum | footer  |
//! | 55 55   | 1 B  | 1 B | len bytes   |   1 B    | AA AA   |
//! +---------+------+-----+-------------+----------+---------+
//! ```
//!
//! The checksum is the XOR of `type`, `len` and every payload byte.

use crate::error::{FrameDefect, ProtocolError};
use crate::{FRAME_ENVELOPE_SIZE, MAX_PAYLOAD_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// Header bytes opening every frame.
pub const HEADER: [u8; 2] = [0x55, 0x55];

/// Footer bytes closing every frame.
pub const FOOTER: [u8; 2] = [0xAA, 0xAA];

/// Computes the XOR checksum over the type byte, the length byte and the payload.
pub fn checksum(frame_type: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(frame_type ^ (payload.len() as u8), |acc, b| acc ^ b)
}

/// A parsed NIIMBOT frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command or response type byte.
    pub frame_type: u8,
    /// Frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given type and payload.
    pub fn new(frame_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// Returns the size of this frame on the wire.
    pub fn encoded_len(&self) -> usize {
        FRAME_ENVELOPE_SIZE + self.payload.len()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let len = self.payload.len();
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(len));
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&HEADER);
        buf.put_u8(self.frame_type);
        buf.put_u8(len as u8);
        buf.put_slice(&self.payload);
        buf.put_u8(checksum(self.frame_type, &self.payload));
        buf.put_slice(&FOOTER);

        Ok(buf)
    }

    /// Decodes exactly one frame from `data`.
    ///
    /// The slice must hold one complete frame and nothing else. Any structural
    /// defect is reported together with the offending bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = |defect| ProtocolError::MalformedFrame {
            defect,
            bytes: Bytes::copy_from_slice(data),
        };

        if data.len() < FRAME_ENVELOPE_SIZE {
            return Err(malformed(FrameDefect::TooShort(data.len())));
        }

        let header = [data[0], data[1]];
        if header != HEADER {
            return Err(malformed(FrameDefect::InvalidHeader(header)));
        }

        let footer = [data[data.len() - 2], data[data.len() - 1]];
        if footer != FOOTER {
            return Err(malformed(FrameDefect::InvalidFooter(footer)));
        }

        let frame_type = data[2];
        let declared = data[3] as usize;
        let actual = data.len() - FRAME_ENVELOPE_SIZE;
        if declared != actual {
            return Err(malformed(FrameDefect::LengthMismatch { declared, actual }));
        }

        let payload = &data[4..4 + declared];
        let expected = checksum(frame_type, payload);
        let received = data[4 + declared];
        if expected != received {
            return Err(malformed(FrameDefect::ChecksumMismatch {
                expected,
                actual: received,
            }));
        }

        Ok(Self {
            frame_type,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_set_density_wire_form() {
        let frame = Frame::new(0x21, vec![0x03]);
        let encoded = frame.encode().unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x55, 0x55, 0x21, 0x01, 0x03, 0x23, 0xAA, 0xAA]
        );
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::new(0x85, vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0xFF]);
        let encoded = frame.encode().unwrap();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::new(0x40, Bytes::new());
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded.len(), FRAME_ENVELOPE_SIZE);
        assert_eq!(encoded[4], 0x40);

        let decoded = Frame::decode(&encoded).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_checksum_validation() {
        let mut encoded = Frame::new(0x31, vec![0x01]).encode().unwrap();
        encoded[5] ^= 0xFF;

        let result = Frame::decode(&encoded);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedFrame {
                defect: FrameDefect::ChecksumMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_header() {
        let result = Frame::decode(&[0x55, 0x54, 0x31, 0x00, 0x31, 0xAA, 0xAA]);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedFrame {
                defect: FrameDefect::InvalidHeader([0x55, 0x54]),
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_footer() {
        let result = Frame::decode(&[0x55, 0x55, 0x31, 0x00, 0x31, 0xAA, 0xAB]);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedFrame {
                defect: FrameDefect::InvalidFooter([0xAA, 0xAB]),
                ..
            })
        ));
    }

    #[test]
    fn test_too_short() {
        let result = Frame::decode(&[0x55, 0x55, 0xAA, 0xAA]);
        match result {
            Err(ProtocolError::MalformedFrame { defect, bytes }) => {
                assert_eq!(defect, FrameDefect::TooShort(4));
                assert_eq!(bytes.as_ref(), &[0x55, 0x55, 0xAA, 0xAA]);
            }
            other => panic!("expected TooShort, got {:?}", other),
        }
    }

    #[test]
    fn test_length_mismatch() {
        // Declares 2 payload bytes, carries 1
        let result = Frame::decode(&[0x55, 0x55, 0x31, 0x02, 0x01, 0x32, 0xAA, 0xAA]);
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedFrame {
                defect: FrameDefect::LengthMismatch {
                    declared: 2,
                    actual: 1
                },
                ..
            })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut data = Frame::new(0x31, vec![0x01]).encode().unwrap().to_vec();
        data.extend_from_slice(&[0xAA, 0xAA]);
        assert!(Frame::decode(&data).is_err());
    }

    #[test]
    fn test_payload_too_large() {
        let frame = Frame::new(0x85, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        let result = frame.encode();
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge(256))));
    }

    #[test]
    fn test_max_payload() {
        let frame = Frame::new(0x85, vec![0x5A; MAX_PAYLOAD_SIZE]);
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded[3], 0xFF);
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(frame_type in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE)) {
            let frame = Frame::new(frame_type, payload);
            let encoded = frame.encode().unwrap();
            prop_assert_eq!(Frame::decode(&encoded).unwrap(), frame);
        }

        #[test]
        fn prop_single_byte_corruption_rejected(
            frame_type in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let mut encoded = Frame::new(frame_type, payload).encode().unwrap();
            let i = index.index(encoded.len());
            encoded[i] ^= flip;
            // A single flipped byte lands in the header, footer, length or
            // checksum coverage; the XOR of one changed byte cannot cancel out.
            prop_assert!(Frame::decode(&encoded).is_err());
        }
    }
}
