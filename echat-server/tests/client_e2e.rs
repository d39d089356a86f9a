//! Real clients against a real server

use std::time::Duration;

use echat_client::{ClientEvent, ClientSessionFactory, Command, CommandQueue};
use echat_net::{Client, ConnectionConfig, Server};
use echat_protocol::{ByteOrder, ResultCode};
use echat_server::{ChatSessionFactory, ChatWorld};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn config() -> ConnectionConfig {
    ConnectionConfig {
        heartbeat_interval: Duration::from_secs(1),
        byte_order: ByteOrder::Big,
    }
}

struct TestClient {
    client: Client<ClientSessionFactory>,
    commands: CommandQueue,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl TestClient {
    async fn connect(server: &Server<ChatSessionFactory>, shutdown: &CancellationToken) -> Self {
        let (factory, events) = ClientSessionFactory::new(Duration::from_secs(1));
        let commands = factory.commands();
        let client = Client::new(server.local_addr().to_string(), factory, config());
        client.start(shutdown).await.unwrap();
        Self {
            client,
            commands,
            events,
        }
    }

    fn submit(&self, command: Command) {
        let connection = self.client.connection().unwrap();
        self.commands.submit(&connection, command).unwrap();
    }

    async fn next(&mut self) -> ClientEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }
}

async fn start_server(idle_timeout: Duration) -> (Server<ChatSessionFactory>, CancellationToken) {
    let factory = ChatSessionFactory::new(ChatWorld::shared(), idle_timeout);
    let server = Server::bind("127.0.0.1:0", factory, config()).await.unwrap();
    let shutdown = CancellationToken::new();
    server.start(&shutdown).unwrap();
    (server, shutdown)
}

#[tokio::test]
async fn two_clients_chat_in_a_channel() {
    let (server, shutdown) = start_server(Duration::from_secs(30)).await;
    let mut alice = TestClient::connect(&server, &shutdown).await;
    let mut bob = TestClient::connect(&server, &shutdown).await;

    alice.submit(Command::Login("alice".into()));
    assert_eq!(
        alice.next().await,
        ClientEvent::LoggedIn {
            username: "alice".into()
        }
    );
    bob.submit(Command::Login("alice".into()));
    assert_eq!(
        bob.next().await,
        ClientEvent::LoginFailed(ResultCode::DuplicatedName)
    );
    bob.submit(Command::Login("bob".into()));
    assert!(matches!(bob.next().await, ClientEvent::LoggedIn { .. }));

    alice.submit(Command::Enter("rust".into()));
    assert!(matches!(alice.next().await, ClientEvent::EnteredChannel { .. }));
    bob.submit(Command::Enter("rust".into()));
    match bob.next().await {
        ClientEvent::EnteredChannel { channel, users, .. } => {
            assert_eq!(channel, "rust");
            assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(alice.next().await, ClientEvent::UserEntered("bob".into()));

    bob.submit(Command::Chat("hi alice".into()));
    let expected = ClientEvent::Chat {
        username: "bob".into(),
        message: "hi alice".into(),
    };
    assert_eq!(alice.next().await, expected);
    assert_eq!(bob.next().await, expected);

    bob.submit(Command::Leave);
    assert_eq!(bob.next().await, ClientEvent::LeftChannel);
    assert_eq!(alice.next().await, ClientEvent::UserLeft("bob".into()));

    bob.submit(Command::Chat("anyone?".into()));
    assert_eq!(
        bob.next().await,
        ClientEvent::Rejected {
            command: "chat",
            state: "Lobby"
        }
    );

    alice.client.stop().await;
    bob.client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn client_keepalive_outlives_idle_timeout() {
    let (server, shutdown) = start_server(Duration::from_secs(2)).await;
    let mut carol = TestClient::connect(&server, &shutdown).await;
    carol.submit(Command::Login("carol".into()));
    assert!(matches!(carol.next().await, ClientEvent::LoggedIn { .. }));

    // Silent apart from keepalives for longer than the idle timeout
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(carol.client.is_connected());

    carol.submit(Command::Enter("quiet".into()));
    assert!(matches!(carol.next().await, ClientEvent::EnteredChannel { .. }));

    carol.client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn quit_and_server_shutdown_disconnect_clients() {
    let (server, shutdown) = start_server(Duration::from_secs(30)).await;
    let mut dave = TestClient::connect(&server, &shutdown).await;
    let mut erin = TestClient::connect(&server, &shutdown).await;

    dave.submit(Command::Quit);
    tokio::time::timeout(WAIT, dave.client.closed()).await.unwrap();
    assert_eq!(dave.next().await, ClientEvent::Disconnected);

    server.stop().await;
    tokio::time::timeout(WAIT, erin.client.closed()).await.unwrap();
    assert_eq!(erin.next().await, ClientEvent::Disconnected);
}
