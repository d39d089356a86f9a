//! Server session states: Threshold → Lobby → Channel

use bytes::Bytes;
use echat_net::{MessageHandler, NetError, State, StateHost};
use echat_protocol::{
    ChatRequest, EnterChannelRequest, EnterChannelResponse, LeaveChannelRequest, LoginRequest,
    LoginResponse, MessageId, Payload, ResultCode,
};
use tracing::{info, warn};

use super::session::ServerSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for a login
    Threshold,
    /// Logged in, outside any channel
    Lobby,
    /// Inside a channel
    Channel,
}

fn install(session: &mut ServerSession, id: MessageId, handler: MessageHandler<ServerSession>) {
    if let Err(e) = session.add_handler(id.as_u32(), handler) {
        warn!(message_id = id.as_u32(), error = %e, "failed to install handler");
    }
}

impl State<ServerSession> for ServerState {
    fn name(self) -> &'static str {
        match self {
            ServerState::Threshold => "Threshold",
            ServerState::Lobby => "Lobby",
            ServerState::Channel => "Channel",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Threshold" => Some(ServerState::Threshold),
            "Lobby" => Some(ServerState::Lobby),
            "Channel" => Some(ServerState::Channel),
            _ => None,
        }
    }

    fn on_enter(self, session: &mut ServerSession) {
        match self {
            ServerState::Threshold => {
                install(session, MessageId::LoginRequest, on_login);
            }
            ServerState::Lobby => {
                install(session, MessageId::EnterChannelRequest, on_enter_channel);
                info!(username = session.username().unwrap_or("-"), "user entered lobby");
            }
            ServerState::Channel => {
                install(session, MessageId::ChatRequest, on_chat);
                install(session, MessageId::LeaveChannelRequest, on_leave_channel);
                info!(username = session.username().unwrap_or("-"), "user entered channel");
            }
        }
    }

    fn on_exit(self, session: &mut ServerSession) {
        match self {
            ServerState::Threshold => {
                session.del_handler(MessageId::LoginRequest.as_u32());
            }
            ServerState::Lobby => {
                session.del_handler(MessageId::EnterChannelRequest.as_u32());
            }
            ServerState::Channel => {
                session.del_handler(MessageId::ChatRequest.as_u32());
                session.del_handler(MessageId::LeaveChannelRequest.as_u32());
                if let Some(name) = session.username() {
                    session.world().lock().leave_channel(name);
                }
            }
        }
    }
}

fn on_login(session: &mut ServerSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let req = LoginRequest::decode(&data)?;
    let connection = session.connection().ok_or(NetError::NotConnected)?;

    let result = session
        .world()
        .lock()
        .create_user(&req.username, connection);
    if result == ResultCode::Success {
        session.set_username(req.username);
        session.translate_to(ServerState::Lobby);
    }

    session.send(&LoginResponse { result });
    Ok(())
}

fn on_enter_channel(session: &mut ServerSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let req = EnterChannelRequest::decode(&data)?;
    let Some(name) = session.username().map(String::from) else {
        session.translate_to(ServerState::Threshold);
        return Ok(());
    };

    let result = session
        .world()
        .lock()
        .enter_channel(&name, &req.channel_name);
    if result == ResultCode::Success {
        session.translate_to(ServerState::Channel);
    } else {
        session.send(&EnterChannelResponse::failed(result));
    }
    Ok(())
}

fn on_chat(session: &mut ServerSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let req = ChatRequest::decode(&data)?;
    let Some(name) = session.username().map(String::from) else {
        return Ok(());
    };

    let delivered = session.world().lock().chat(&name, &req.message);
    if !delivered {
        session.translate_to(ServerState::Lobby);
    }
    Ok(())
}

fn on_leave_channel(session: &mut ServerSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    LeaveChannelRequest::decode(&data)?;
    session.translate_to(ServerState::Lobby);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for state in [ServerState::Threshold, ServerState::Lobby, ServerState::Channel] {
            assert_eq!(ServerState::from_name(state.name()), Some(state));
        }
        assert_eq!(ServerState::from_name("Attic"), None);
    }
}
