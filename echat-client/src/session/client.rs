//! Client side session

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use echat_net::{
    ConnectionHandle, NetError, ScheduleKind, Session, SessionFactory, State, StateHost,
    StateMachine,
};
use echat_protocol::{
    ChatRequest, EnterChannelRequest, Envelope, Heartbeat, LeaveChannelRequest, LoginRequest,
    Payload,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::events::ClientEvent;
use super::states::ClientState;
use crate::console::{Command, CommandQueue};

/// Session driving one connection to the chat server
pub struct ClientSession {
    events: mpsc::UnboundedSender<ClientEvent>,
    commands: CommandQueue,
    heartbeat_interval: Duration,
    connection: Option<ConnectionHandle<ClientSession>>,
    pending_username: Option<String>,
    username: Option<String>,
    channel: Option<String>,
    machine: StateMachine<ClientSession, ClientState>,
}

impl ClientSession {
    pub fn new(
        events: mpsc::UnboundedSender<ClientEvent>,
        commands: CommandQueue,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            events,
            commands,
            heartbeat_interval,
            connection: None,
            pending_username: None,
            username: None,
            channel: None,
            machine: StateMachine::new(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    pub(crate) fn send<P: Payload>(&self, payload: &P) -> bool {
        match &self.connection {
            Some(connection) => connection.send_message(payload),
            None => false,
        }
    }

    pub(crate) fn confirm_login(&mut self) -> String {
        let name = self.pending_username.take().unwrap_or_default();
        self.username = Some(name.clone());
        name
    }

    pub(crate) fn set_channel(&mut self, channel: Option<String>) {
        self.channel = channel;
    }

    /// Execute every queued console command, oldest first
    pub fn run_pending_commands(&mut self) {
        while let Some(command) = self.commands.pop() {
            self.execute(command);
        }
    }

    /// Carry out a console command in the current state
    pub fn execute(&mut self, command: Command) {
        let state = self.current_state();
        let accepted = state.is_some_and(|s| s.accepts(&command));
        if !accepted {
            self.emit(ClientEvent::Rejected {
                command: command.name(),
                state: state.map(|s| s.name()).unwrap_or("-"),
            });
            return;
        }

        match command {
            Command::Login(username) => {
                self.send(&LoginRequest {
                    username: username.clone(),
                });
                self.pending_username = Some(username);
            }
            Command::Enter(channel_name) => {
                self.send(&EnterChannelRequest { channel_name });
            }
            Command::Chat(message) => {
                self.send(&ChatRequest { message });
            }
            Command::Leave => {
                self.send(&LeaveChannelRequest);
            }
            Command::Quit => {
                info!("quit requested");
                if let Some(connection) = &self.connection {
                    connection.stop();
                }
            }
        }
    }
}

impl StateHost for ClientSession {
    type State = ClientState;

    fn machine(&self) -> &StateMachine<Self, ClientState> {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut StateMachine<Self, ClientState> {
        &mut self.machine
    }
}

impl Session for ClientSession {
    fn initialize(&mut self, connection: ConnectionHandle<Self>) -> Result<(), NetError> {
        connection.schedule_task(
            self.heartbeat_interval,
            ScheduleKind::Repeating,
            Arc::new(|session: &mut ClientSession, _period: Duration, _at: Instant| {
                session.send(&Heartbeat);
            }),
        )?;
        self.connection = Some(connection);
        self.translate_to(ClientState::Threshold);
        Ok(())
    }

    fn uninitialized(&mut self) {
        self.shutdown_states();
        self.emit(ClientEvent::Disconnected);
    }

    fn on_recv_message(&mut self, data: Bytes) {
        match Envelope::unpack(data) {
            Ok(envelope) => {
                self.dispatch(envelope);
            }
            Err(e) => {
                warn!(error = %e, "malformed envelope from server, disconnecting");
                if let Some(connection) = &self.connection {
                    connection.stop();
                }
            }
        }
    }

    fn check_heartbeat(&mut self) -> bool {
        true
    }
}

/// Creates the client's session and owns the sending half of its events
pub struct ClientSessionFactory {
    events: mpsc::UnboundedSender<ClientEvent>,
    commands: CommandQueue,
    heartbeat_interval: Duration,
}

impl ClientSessionFactory {
    pub fn new(heartbeat_interval: Duration) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                commands: CommandQueue::new(),
                heartbeat_interval,
            },
            rx,
        )
    }

    /// Queue the console submits commands to
    pub fn commands(&self) -> CommandQueue {
        self.commands.clone()
    }
}

impl SessionFactory for ClientSessionFactory {
    type Session = ClientSession;

    fn create_session(&self) -> ClientSession {
        ClientSession::new(
            self.events.clone(),
            self.commands.clone(),
            self.heartbeat_interval,
        )
    }
}
