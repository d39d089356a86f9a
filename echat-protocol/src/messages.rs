//! Chat message ids and payloads
//!
//! Payloads are serde structs encoded with bincode and carried in an
//! [`Envelope`]. Each payload type is bound to its id through [`Payload`].

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::codec::CodecError;
use crate::envelope::Envelope;

/// Message ids on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageId {
    LoginRequest = 1,
    LoginResponse = 2,
    EnterChannelRequest = 3,
    EnterChannelResponse = 4,
    LeaveChannelRequest = 5,
    LeaveChannelResponse = 6,
    ChatRequest = 7,
    ChatResponse = 8,
    UserActionNotify = 9,
    Heartbeat = 100,
}

impl MessageId {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl From<MessageId> for u32 {
    fn from(id: MessageId) -> Self {
        id as u32
    }
}

impl TryFrom<u32> for MessageId {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => MessageId::LoginRequest,
            2 => MessageId::LoginResponse,
            3 => MessageId::EnterChannelRequest,
            4 => MessageId::EnterChannelResponse,
            5 => MessageId::LeaveChannelRequest,
            6 => MessageId::LeaveChannelResponse,
            7 => MessageId::ChatRequest,
            8 => MessageId::ChatResponse,
            9 => MessageId::UserActionNotify,
            100 => MessageId::Heartbeat,
            other => return Err(other),
        })
    }
}

/// Outcome of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    #[default]
    Success,
    Error,
    DuplicatedName,
    NotFoundUser,
    AlreadyInChannel,
}

/// Membership change announced to channel members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserAction {
    EnterChannel,
    LeaveChannel,
}

/// One line of channel history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContent {
    pub user: String,
    pub words: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub result: ResultCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterChannelRequest {
    pub channel_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterChannelResponse {
    pub result: ResultCode,
    pub channel_name: String,
    pub users: Vec<String>,
    /// Latest channel history, oldest first
    pub contents: Vec<ChatContent>,
}

impl EnterChannelResponse {
    /// A failed response carrying only the result code
    pub fn failed(result: ResultCode) -> Self {
        Self {
            result,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveChannelRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveChannelResponse {
    pub result: ResultCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActionNotify {
    pub action: UserAction,
    pub username: String,
}

/// Keepalive; carries no data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat;

/// A serde payload bound to its message id
pub trait Payload: Serialize + DeserializeOwned {
    const ID: MessageId;

    /// Encode into an envelope tagged with [`Self::ID`]
    fn to_envelope(&self) -> Result<Envelope, CodecError> {
        let bytes = bincode::serialize(self)?;
        Ok(Envelope::new(Self::ID.as_u32(), bytes))
    }

    /// Decode from envelope payload bytes
    fn decode(payload: &Bytes) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(payload)?)
    }
}

macro_rules! bind_payload {
    ($($ty:ident),* $(,)?) => {
        $(impl Payload for $ty {
            const ID: MessageId = MessageId::$ty;
        })*
    };
}

bind_payload!(
    LoginRequest,
    LoginResponse,
    EnterChannelRequest,
    EnterChannelResponse,
    LeaveChannelRequest,
    LeaveChannelResponse,
    ChatRequest,
    ChatResponse,
    UserActionNotify,
    Heartbeat,
);
