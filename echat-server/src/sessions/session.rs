//! Per-connection chat session

use std::time::Duration;

use bytes::Bytes;
use echat_net::{
    ConnectionHandle, NetError, Session, SessionFactory, StateHost, StateMachine,
};
use echat_protocol::{Envelope, MessageId, Payload};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::states::ServerState;
use super::world::SharedWorld;

/// Server side of one client connection
pub struct ServerSession {
    world: SharedWorld,
    idle_timeout: Duration,
    connection: Option<ConnectionHandle<ServerSession>>,
    username: Option<String>,
    last_active: Instant,
    machine: StateMachine<ServerSession, ServerState>,
}

impl ServerSession {
    pub fn new(world: SharedWorld, idle_timeout: Duration) -> Self {
        Self {
            world,
            idle_timeout,
            connection: None,
            username: None,
            last_active: Instant::now(),
            machine: StateMachine::new(),
        }
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn connection(&self) -> Option<ConnectionHandle<ServerSession>> {
        self.connection.clone()
    }

    /// Name of the logged-in user
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub(crate) fn set_username(&mut self, name: String) {
        self.username = Some(name);
    }

    /// Queue a typed message to this session's client
    pub fn send<P: Payload>(&self, payload: &P) -> bool {
        match &self.connection {
            Some(connection) => connection.send_message(payload),
            None => false,
        }
    }

    fn connection_id(&self) -> u32 {
        self.connection.as_ref().map(|c| c.id()).unwrap_or(0)
    }
}

impl StateHost for ServerSession {
    type State = ServerState;

    fn machine(&self) -> &StateMachine<Self, ServerState> {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut StateMachine<Self, ServerState> {
        &mut self.machine
    }
}

impl Session for ServerSession {
    fn initialize(&mut self, connection: ConnectionHandle<Self>) -> Result<(), NetError> {
        info!(connection_id = connection.id(), peer = %connection.peer(), "session opened");
        self.connection = Some(connection);
        self.last_active = Instant::now();
        self.translate_to(ServerState::Threshold);
        Ok(())
    }

    fn uninitialized(&mut self) {
        self.shutdown_states();
        if let Some(name) = self.username.take() {
            self.world.lock().remove_user(&name);
        }
        info!(connection_id = self.connection_id(), "session closed");
    }

    fn on_recv_message(&mut self, data: Bytes) {
        self.last_active = Instant::now();

        let envelope = match Envelope::unpack(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(connection_id = self.connection_id(), error = %e, "malformed envelope, closing connection");
                if let Some(connection) = &self.connection {
                    connection.stop();
                }
                return;
            }
        };

        if envelope.message_id == MessageId::Heartbeat.as_u32() {
            debug!(connection_id = self.connection_id(), "heartbeat");
            return;
        }
        self.dispatch(envelope);
    }

    fn check_heartbeat(&mut self) -> bool {
        let idle = self.last_active.elapsed();
        if idle > self.idle_timeout {
            info!(
                connection_id = self.connection_id(),
                username = self.username().unwrap_or("-"),
                idle_secs = idle.as_secs(),
                "client idle too long"
            );
            return false;
        }
        true
    }
}

/// Creates a [`ServerSession`] per accepted connection
pub struct ChatSessionFactory {
    world: SharedWorld,
    idle_timeout: Duration,
}

impl ChatSessionFactory {
    pub fn new(world: SharedWorld, idle_timeout: Duration) -> Self {
        Self {
            world,
            idle_timeout,
        }
    }
}

impl SessionFactory for ChatSessionFactory {
    type Session = ServerSession;

    fn create_session(&self) -> ServerSession {
        ServerSession::new(self.world.clone(), self.idle_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::ChatWorld;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_fails_after_idle_timeout() {
        let mut session = ServerSession::new(ChatWorld::shared(), Duration::from_secs(10));
        assert!(session.check_heartbeat());

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(session.check_heartbeat());

        // Any inbound envelope counts as activity
        session.on_recv_message(echat_protocol::Heartbeat.to_envelope().unwrap().pack().unwrap());
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(session.check_heartbeat());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!session.check_heartbeat());
    }

    #[test]
    fn test_new_session_has_no_state() {
        let session = ServerSession::new(ChatWorld::shared(), Duration::from_secs(30));
        assert_eq!(session.current_state(), None);
        assert_eq!(session.username(), None);
        assert!(!session.send(&echat_protocol::Heartbeat));
    }
}
