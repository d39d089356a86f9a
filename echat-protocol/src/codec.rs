//! Length-delimited framing for the TCP stream
//!
//! Every frame is `[u32 total length][payload]` where the total length counts
//! its own four header bytes. The codec is payload-agnostic; envelopes are
//! layered on top in [`crate::envelope`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Maximum frame size including the length header (5 MB)
pub const MAX_FRAME_SIZE: usize = 5 * 1024 * 1024;

/// Size of the frame length header
pub const FRAME_HEADER_SIZE: usize = 4;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame too short: declared length {length} cannot hold its header")]
    FrameTooShort { length: usize },

    #[error("Envelope overflow: {size} bytes (max {max})")]
    EnvelopeOverflow { size: usize, max: usize },

    #[error("Invalid pack length: declared {declared} bytes, {available} available")]
    InvalidEnvelopeLength { declared: usize, available: usize },
}

/// Byte order of the frame length field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Big,
    #[default]
    Little,
}

impl ByteOrder {
    fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Big => u32::from_be_bytes(bytes),
            ByteOrder::Little => u32::from_le_bytes(bytes),
        }
    }

    fn put_u32(self, dst: &mut BytesMut, value: u32) {
        match self {
            ByteOrder::Big => dst.put_u32(value),
            ByteOrder::Little => dst.put_u32_le(value),
        }
    }
}

/// Frame codec for one connection
///
/// Decodes to the frame payload with the header stripped; encodes a payload by
/// prefixing its total length.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    connection_id: u32,
    byte_order: ByteOrder,
}

impl WireCodec {
    pub fn new(connection_id: u32, byte_order: ByteOrder) -> Self {
        Self {
            connection_id,
            byte_order,
        }
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }
}

impl Decoder for WireCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at length without consuming
        let length = self
            .byte_order
            .read_u32([src[0], src[1], src[2], src[3]]) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }
        if length < FRAME_HEADER_SIZE {
            return Err(CodecError::FrameTooShort { length });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(length - FRAME_HEADER_SIZE).freeze();
        trace!(
            connection_id = self.connection_id,
            len = payload.len(),
            "frame decoded"
        );
        Ok(Some(payload))
    }
}

impl Encoder<Bytes> for WireCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total = item.len() + FRAME_HEADER_SIZE;
        if total > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: total,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(total);
        self.byte_order.put_u32(dst, total as u32);
        dst.put_slice(&item);
        trace!(
            connection_id = self.connection_id,
            len = item.len(),
            "frame encoded"
        );
        Ok(())
    }
}
