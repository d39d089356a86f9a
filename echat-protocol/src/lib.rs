//! echat-protocol: Shared wire definitions for client-server communication
//!
//! Two framing layers are defined here:
//! - [`WireCodec`]: `[u32 total length][payload]` frames on the TCP stream
//! - [`Envelope`]: `[u16 payload length][u32 message id][payload]` inside one frame
//!
//! plus the chat message ids and payloads carried by envelopes.

pub mod codec;
pub mod envelope;
pub mod messages;

pub use codec::{ByteOrder, CodecError, WireCodec, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use envelope::{Envelope, ENVELOPE_HEADER_SIZE, MAX_ENVELOPE_PAYLOAD, MAX_ENVELOPE_SIZE};
pub use messages::{
    ChatContent, ChatRequest, ChatResponse, EnterChannelRequest, EnterChannelResponse,
    Heartbeat, LeaveChannelRequest, LeaveChannelResponse, LoginRequest, LoginResponse,
    MessageId, Payload, ResultCode, UserAction, UserActionNotify,
};
