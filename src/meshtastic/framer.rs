//! Stream framing for the Meshtastic TCP API.
//!
//! Each protobuf message travels as:
//!
//!   `0x94 0xC3 <len_hi> <len_lo> <protobuf bytes>`
//!
//! [`FrameDecoder`] is fed arbitrary reads and yields whole payloads. Bytes
//! before a start marker (device debug output, a torn frame after reconnect)
//! are discarded, and a header announcing an impossible length drops one byte
//! so the decoder can resynchronise on the next marker.
use bytes::{Buf, BytesMut};

use super::TransportError;

pub const START1: u8 = 0x94;
pub const START2: u8 = 0xC3;
const HEADER_LEN: usize = 4;
/// Largest payload the radio will emit or accept.
pub const MAX_PAYLOAD: usize = 512;

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete payload, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.buf.len() < HEADER_LEN {
                return None;
            }
            if !(self.buf[0] == START1 && self.buf[1] == START2) {
                match self.buf.iter().skip(1).position(|&b| b == START1) {
                    Some(pos) => self.buf.advance(pos + 1),
                    None => {
                        // keep a trailing marker byte, it may be the start of the next header
                        let keep = usize::from(self.buf.last() == Some(&START1));
                        let drop = self.buf.len() - keep;
                        self.buf.advance(drop);
                        return None;
                    }
                }
                continue;
            }
            let declared = ((self.buf[2] as usize) << 8) | (self.buf[3] as usize);
            if declared == 0 || declared > MAX_PAYLOAD {
                self.buf.advance(1);
                continue;
            }
            if self.buf.len() < HEADER_LEN + declared {
                return None;
            }
            self.buf.advance(HEADER_LEN);
            return Some(self.buf.split_to(declared).to_vec());
        }
    }
}

/// Prefix `payload` with the stream header.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(START1);
    out.push(START2);
    out.push(((payload.len() >> 8) & 0xFF) as u8);
    out.push((payload.len() & 0xFF) as u8);
    out.extend_from_slice(payload);
    Ok(out)
}
