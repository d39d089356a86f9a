//! Application envelope carried inside one wire frame
//!
//! Layout (little-endian): `[u16 payload length][u32 message id][payload]`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::CodecError;

/// Maximum packed envelope size (1 MB)
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// Size of the envelope header (length + message id)
pub const ENVELOPE_HEADER_SIZE: usize = 6;

/// Largest payload the u16 length field can describe
pub const MAX_ENVELOPE_PAYLOAD: usize = u16::MAX as usize;

/// A typed message: id plus opaque payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: u32,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(message_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            message_id,
            payload: payload.into(),
        }
    }

    /// Serialize into a single buffer ready for one wire frame
    pub fn pack(&self) -> Result<Bytes, CodecError> {
        let total = ENVELOPE_HEADER_SIZE + self.payload.len();
        if total > MAX_ENVELOPE_SIZE {
            return Err(CodecError::EnvelopeOverflow {
                size: total,
                max: MAX_ENVELOPE_SIZE,
            });
        }
        if self.payload.len() > MAX_ENVELOPE_PAYLOAD {
            return Err(CodecError::EnvelopeOverflow {
                size: self.payload.len(),
                max: MAX_ENVELOPE_PAYLOAD,
            });
        }

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_u32_le(self.message_id);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse one envelope; bytes past the declared payload are ignored
    pub fn unpack(mut data: Bytes) -> Result<Self, CodecError> {
        if data.len() < ENVELOPE_HEADER_SIZE {
            return Err(CodecError::InvalidEnvelopeLength {
                declared: ENVELOPE_HEADER_SIZE,
                available: data.len(),
            });
        }

        let declared = data.get_u16_le() as usize;
        let message_id = data.get_u32_le();
        if declared > data.len() {
            return Err(CodecError::InvalidEnvelopeLength {
                declared,
                available: data.len(),
            });
        }

        Ok(Self {
            message_id,
            payload: data.split_to(declared),
        })
    }
}
