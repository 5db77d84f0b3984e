//! Stream framing for byte chunks arriving from the printer.
//!
//! Transports may split one frame over several notifications or glue
//! several frames together. [`FrameAssembler`] buffers incoming bytes and yields
//! one candidate frame at a time; validation is left to [`Frame::decode`].

use crate::frame::{Frame, FOOTER, HEADER};
use crate::FRAME_ENVELOPE_SIZE;
use bytes::{Buf, Bytes, BytesMut};

/// Upper bound on buffered bytes before the assembler gives up and resyncs.
pub const MAX_BUFFERED: usize = 4096;

/// Reassembles candidate frames from an unframed byte stream.
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(512),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFERED {
            tracing::warn!(
                buffered = self.buffer.len(),
                "Inbound buffer overflow, discarding"
            );
            self.buffer.clear();
        }
    }

    /// Returns the raw bytes of the next candidate frame, if complete.
    ///
    /// Bytes before a `55 55` header are dropped. A candidate is emitted once
    /// its declared length is buffered and it ends in `AA AA`; the checksum
    /// is not checked here. A header whose candidate has no footer is treated
    /// as noise and skipped, as is a header still waiting for bytes while a
    /// complete, valid frame follows it.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            self.resync();

            let total = self.declared_len(0)?;
            if self.buffer.len() >= total {
                if self.buffer[total - 2..total] == FOOTER {
                    return Some(self.buffer.split_to(total).freeze());
                }
                tracing::debug!(
                    candidate = %hex::encode(&self.buffer[..total]),
                    "Candidate has no footer, resyncing"
                );
                self.buffer.advance(1);
                continue;
            }

            let start = self.later_frame()?;
            tracing::debug!(
                discarded = %hex::encode(&self.buffer[..start]),
                "Incomplete candidate overtaken by a later frame"
            );
            self.buffer.advance(start);
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Frame size declared by a header at `at`, once its length byte is in.
    fn declared_len(&self, at: usize) -> Option<usize> {
        self.buffer
            .get(at + 3)
            .map(|&len| FRAME_ENVELOPE_SIZE + len as usize)
    }

    /// Offset of the first complete, valid frame after position 0.
    fn later_frame(&self) -> Option<usize> {
        (1..self.buffer.len().saturating_sub(1))
            .filter(|&at| self.buffer[at..at + 2] == HEADER)
            .find(|&at| match self.declared_len(at) {
                Some(total) if at + total <= self.buffer.len() => {
                    Frame::decode(&self.buffer[at..at + total]).is_ok()
                }
                _ => false,
            })
    }

    fn resync(&mut self) {
        let start = self
            .buffer
            .windows(2)
            .position(|w| w == HEADER)
            .unwrap_or_else(|| {
                // Keep a trailing 0x55 that may begin the next header
                match self.buffer.last() {
                    Some(&b) if b == HEADER[0] => self.buffer.len() - 1,
                    _ => self.buffer.len(),
                }
            });

        if start > 0 {
            tracing::debug!(
                discarded = %hex::encode(&self.buffer[..start]),
                "Skipping bytes before frame header"
            );
            self.buffer.advance(start);
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProtocolError;

    fn decode_next(assembler: &mut FrameAssembler) -> Option<Result<Frame, ProtocolError>> {
        assembler.next_frame().map(|raw| Frame::decode(&raw))
    }

    fn encoded(frame_type: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(frame_type, payload.to_vec())
            .encode()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_assembler_single_frame() {
        let mut assembler = FrameAssembler::new();
        assembler.extend(&encoded(0x31, &[1]));

        let frame = decode_next(&mut assembler).unwrap().unwrap();
        assert_eq!(frame.frame_type, 0x31);
        assert_eq!(frame.payload.as_ref(), &[1]);
        assert!(assembler.next_frame().is_none());
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_assembler_multiple_frames() {
        let mut data = encoded(0x31, &[1]);
        data.extend(encoded(0x4B, &[0, 0, 0, 0x55]));

        let mut assembler = FrameAssembler::new();
        assembler.extend(&data);

        assert_eq!(decode_next(&mut assembler).unwrap().unwrap().frame_type, 0x31);
        assert_eq!(decode_next(&mut assembler).unwrap().unwrap().frame_type, 0x4B);
        assert!(decode_next(&mut assembler).is_none());
    }

    #[test]
    fn test_assembler_partial_frame() {
        let data = encoded(0xB3, &[0x00, 0x01, 0x64, 0x64]);

        let mut assembler = FrameAssembler::new();
        assembler.extend(&data[..3]);
        assert!(assembler.next_frame().is_none());

        assembler.extend(&data[3..6]);
        assert!(assembler.next_frame().is_none());

        assembler.extend(&data[6..]);
        let raw = assembler.next_frame().unwrap();
        assert_eq!(raw.as_ref(), data.as_slice());
    }

    #[test]
    fn test_assembler_skips_garbage() {
        let mut data = vec![0x00, 0x12, 0x55, 0xAA];
        data.extend(encoded(0x31, &[1]));

        let mut assembler = FrameAssembler::new();
        assembler.extend(&data);
        let frame = decode_next(&mut assembler).unwrap().unwrap();
        assert_eq!(frame.frame_type, 0x31);
    }

    #[test]
    fn test_assembler_keeps_split_header() {
        let data = encoded(0x31, &[1]);

        let mut assembler = FrameAssembler::new();
        assembler.extend(&[0x07, 0x55]);
        assert!(assembler.next_frame().is_none());
        assert_eq!(assembler.buffered(), 1);

        assembler.extend(&data[1..]);
        assert_eq!(assembler.next_frame().unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn test_assembler_surfaces_corrupt_frame() {
        let mut data = encoded(0x31, &[1]);
        data[5] ^= 0x01;

        let mut assembler = FrameAssembler::new();
        assembler.extend(&data);
        assert!(decode_next(&mut assembler).unwrap().is_err());
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_assembler_stray_header_byte() {
        let data = encoded(0x31, &[1]);
        let mut stream = vec![0x55];
        stream.extend(&data);

        let mut assembler = FrameAssembler::new();
        assembler.extend(&stream);
        assert_eq!(assembler.next_frame().unwrap().as_ref(), data.as_slice());
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_assembler_stray_header_byte_split_reads() {
        let data = encoded(0xB3, &[0x00, 0x01, 0x64, 0x64]);

        let mut assembler = FrameAssembler::new();
        assembler.extend(&[0x55]);
        assembler.extend(&data[..5]);
        assert!(assembler.next_frame().is_none());

        assembler.extend(&data[5..]);
        assert_eq!(assembler.next_frame().unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn test_assembler_bad_length_then_valid_frame() {
        let mut stream = encoded(0x31, &[1]);
        // Declares one byte more than was sent, so no footer where expected
        stream[3] = 0x02;
        stream.extend(encoded(0x4B, &[0, 0, 0, 0x55]));

        let mut assembler = FrameAssembler::new();
        assembler.extend(&stream);
        let frame = decode_next(&mut assembler).unwrap().unwrap();
        assert_eq!(frame.frame_type, 0x4B);
        assert!(assembler.next_frame().is_none());
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_assembler_oversized_length_then_valid_frame() {
        let mut stream = encoded(0x31, &[1]);
        stream[3] = 0xF0;
        stream.extend(encoded(0x33, &[1]));

        let mut assembler = FrameAssembler::new();
        assembler.extend(&stream);
        let frame = decode_next(&mut assembler).unwrap().unwrap();
        assert_eq!(frame.frame_type, 0x33);
    }

    #[test]
    fn test_assembler_corrupt_checksum_then_valid_frame() {
        let mut stream = encoded(0x31, &[1]);
        stream[5] ^= 0x01;
        stream.extend(encoded(0x33, &[1]));

        let mut assembler = FrameAssembler::new();
        assembler.extend(&stream);
        assert!(decode_next(&mut assembler).unwrap().is_err());
        assert_eq!(decode_next(&mut assembler).unwrap().unwrap().frame_type, 0x33);
    }

    #[test]
    fn test_assembler_overflow_clears() {
        let mut assembler = FrameAssembler::new();
        // Header declaring 255 bytes that never complete
        assembler.extend(&[0x55, 0x55, 0x85, 0xFF]);
        assembler.extend(&vec![0u8; MAX_BUFFERED]);
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_assembler_clear() {
        let mut assembler = FrameAssembler::new();
        assembler.extend(&[0x55, 0x55, 0x31]);
        assembler.clear();
        assert_eq!(assembler.buffered(), 0);
    }
}
