//! Client session states, mirroring the server's

use bytes::Bytes;
use echat_net::{MessageHandler, NetError, State, StateHost};
use echat_protocol::{
    ChatResponse, EnterChannelResponse, LeaveChannelResponse, LoginResponse, MessageId, Payload,
    ResultCode, UserAction, UserActionNotify,
};
use tracing::warn;

use super::client::ClientSession;
use super::events::ClientEvent;
use crate::console::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Threshold,
    Lobby,
    Channel,
}

impl ClientState {
    /// Whether `command` may be issued in this state
    pub fn accepts(self, command: &Command) -> bool {
        matches!(
            (self, command),
            (_, Command::Quit)
                | (ClientState::Threshold, Command::Login(_))
                | (ClientState::Lobby, Command::Enter(_))
                | (ClientState::Channel, Command::Chat(_) | Command::Leave)
        )
    }

    fn handled(self) -> &'static [MessageId] {
        match self {
            ClientState::Threshold => &[MessageId::LoginResponse],
            ClientState::Lobby => &[MessageId::EnterChannelResponse],
            ClientState::Channel => &[
                MessageId::ChatResponse,
                MessageId::LeaveChannelResponse,
                MessageId::UserActionNotify,
            ],
        }
    }
}

fn handler_for(id: MessageId) -> Option<MessageHandler<ClientSession>> {
    match id {
        MessageId::LoginResponse => Some(on_login_response),
        MessageId::EnterChannelResponse => Some(on_enter_response),
        MessageId::ChatResponse => Some(on_chat),
        MessageId::LeaveChannelResponse => Some(on_leave_response),
        MessageId::UserActionNotify => Some(on_user_action),
        _ => None,
    }
}

impl State<ClientSession> for ClientState {
    fn name(self) -> &'static str {
        match self {
            ClientState::Threshold => "Threshold",
            ClientState::Lobby => "Lobby",
            ClientState::Channel => "Channel",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Threshold" => Some(ClientState::Threshold),
            "Lobby" => Some(ClientState::Lobby),
            "Channel" => Some(ClientState::Channel),
            _ => None,
        }
    }

    fn on_enter(self, session: &mut ClientSession) {
        for &id in self.handled() {
            let Some(handler) = handler_for(id) else {
                continue;
            };
            if let Err(e) = session.add_handler(id.as_u32(), handler) {
                warn!(state = self.name(), message_id = id.as_u32(), error = %e, "failed to install handler");
            }
        }
    }

    fn on_exit(self, session: &mut ClientSession) {
        for &id in self.handled() {
            session.del_handler(id.as_u32());
        }
    }
}

fn on_login_response(session: &mut ClientSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let response = LoginResponse::decode(&data)?;
    if response.result == ResultCode::Success {
        let username = session.confirm_login();
        session.translate_to(ClientState::Lobby);
        session.emit(ClientEvent::LoggedIn { username });
    } else {
        session.emit(ClientEvent::LoginFailed(response.result));
    }
    Ok(())
}

fn on_enter_response(session: &mut ClientSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let response = EnterChannelResponse::decode(&data)?;
    if response.result != ResultCode::Success {
        session.emit(ClientEvent::EnterFailed(response.result));
        return Ok(());
    }

    session.set_channel(Some(response.channel_name.clone()));
    session.translate_to(ClientState::Channel);
    session.emit(ClientEvent::EnteredChannel {
        channel: response.channel_name,
        users: response.users,
        history: response.contents,
    });
    Ok(())
}

fn on_chat(session: &mut ClientSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let ChatResponse { username, message } = ChatResponse::decode(&data)?;
    session.emit(ClientEvent::Chat { username, message });
    Ok(())
}

fn on_leave_response(session: &mut ClientSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let response = LeaveChannelResponse::decode(&data)?;
    if response.result != ResultCode::Success {
        return Err(NetError::handler(format!(
            "leave rejected: {:?}",
            response.result
        )));
    }
    session.set_channel(None);
    session.translate_to(ClientState::Lobby);
    session.emit(ClientEvent::LeftChannel);
    Ok(())
}

fn on_user_action(session: &mut ClientSession, _id: u32, data: Bytes) -> Result<(), NetError> {
    let notify = UserActionNotify::decode(&data)?;
    let event = match notify.action {
        UserAction::EnterChannel => ClientEvent::UserEntered(notify.username),
        UserAction::LeaveChannel => ClientEvent::UserLeft(notify.username),
    };
    session.emit(event);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use echat_protocol::{ChatContent, Envelope};
    use echat_net::Session;
    use tokio::sync::mpsc;

    fn lobby_session() -> (ClientSession, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = ClientSession::new(
            tx,
            crate::console::CommandQueue::new(),
            std::time::Duration::from_secs(5),
        );
        session.translate_to(ClientState::Lobby);
        (session, rx)
    }

    fn deliver<P: Payload>(session: &mut ClientSession, payload: &P) {
        let data = payload.to_envelope().and_then(|e| e.pack()).unwrap();
        session.on_recv_message(data);
    }

    #[test]
    fn test_accepts() {
        assert!(ClientState::Threshold.accepts(&Command::Login("a".into())));
        assert!(!ClientState::Threshold.accepts(&Command::Enter("rust".into())));
        assert!(ClientState::Lobby.accepts(&Command::Enter("rust".into())));
        assert!(!ClientState::Lobby.accepts(&Command::Leave));
        assert!(ClientState::Channel.accepts(&Command::Chat("hi".into())));
        assert!(ClientState::Channel.accepts(&Command::Leave));
        for state in [ClientState::Threshold, ClientState::Lobby, ClientState::Channel] {
            assert!(state.accepts(&Command::Quit));
        }
    }

    #[test]
    fn test_handler_tables_follow_state() {
        let (mut session, _rx) = lobby_session();
        assert!(session.machine().has_handler(MessageId::EnterChannelResponse.as_u32()));
        assert!(!session.machine().has_handler(MessageId::ChatResponse.as_u32()));

        session.translate_to(ClientState::Channel);
        assert!(!session.machine().has_handler(MessageId::EnterChannelResponse.as_u32()));
        assert_eq!(session.machine().handler_count(), 3);
    }

    #[test]
    fn test_channel_flow() {
        let (mut session, mut rx) = lobby_session();

        deliver(
            &mut session,
            &EnterChannelResponse {
                result: ResultCode::Success,
                channel_name: "rust".into(),
                users: vec!["alice".into()],
                contents: vec![ChatContent {
                    user: "bob".into(),
                    words: "earlier".into(),
                }],
            },
        );
        assert!(matches!(rx.try_recv().unwrap(), ClientEvent::EnteredChannel { ref channel, .. } if channel == "rust"));
        assert_eq!(session.channel(), Some("rust"));

        deliver(
            &mut session,
            &UserActionNotify {
                action: UserAction::EnterChannel,
                username: "carol".into(),
            },
        );
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::UserEntered("carol".into()));

        deliver(
            &mut session,
            &ChatResponse {
                username: "carol".into(),
                message: "hey".into(),
            },
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::Chat {
                username: "carol".into(),
                message: "hey".into()
            }
        );

        deliver(
            &mut session,
            &LeaveChannelResponse {
                result: ResultCode::Success,
            },
        );
        assert_eq!(rx.try_recv().unwrap(), ClientEvent::LeftChannel);
        assert_eq!(session.current_state(), Some(ClientState::Lobby));
        assert_eq!(session.channel(), None);
    }

    #[test]
    fn test_failed_enter_and_stray_messages() {
        let (mut session, mut rx) = lobby_session();
        deliver(&mut session, &EnterChannelResponse::failed(ResultCode::AlreadyInChannel));
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEvent::EnterFailed(ResultCode::AlreadyInChannel)
        );

        // Chat outside a channel has no handler and is dropped
        deliver(
            &mut session,
            &ChatResponse {
                username: "x".into(),
                message: "y".into(),
            },
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(session.current_state(), Some(ClientState::Lobby));

        // Unknown ids are dropped too
        session.on_recv_message(Envelope::new(4242, vec![1, 2]).pack().unwrap());
        assert!(rx.try_recv().is_err());
    }
}
