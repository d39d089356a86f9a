//! Outbound side: one dialed connection per client

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::connection::{Connection, ConnectionConfig, ConnectionHandle};
use crate::session::SessionFactory;
use crate::NetError;

/// Connection id used by every client
pub const CLIENT_CONNECTION_ID: u32 = 1;

struct Running<S> {
    handle: Option<ConnectionHandle<S>>,
    task: Option<JoinHandle<()>>,
}

/// TCP client owning exactly one connection
///
/// There is no reconnection: once the connection drops the client is done.
pub struct Client<F: SessionFactory> {
    addr: String,
    factory: F,
    config: ConnectionConfig,
    running: Arc<Mutex<Running<F::Session>>>,
    started: Mutex<bool>,
    finished: CancellationToken,
}

impl<F: SessionFactory> Client<F> {
    pub fn new(addr: impl Into<String>, factory: F, config: ConnectionConfig) -> Self {
        Self {
            addr: addr.into(),
            factory,
            config,
            running: Arc::new(Mutex::new(Running {
                handle: None,
                task: None,
            })),
            started: Mutex::new(false),
            finished: CancellationToken::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Dial the server and launch the connection under `shutdown`
    pub async fn start(&self, shutdown: &CancellationToken) -> Result<(), NetError> {
        {
            let mut started = self.started.lock();
            if *started {
                return Err(NetError::AlreadyStarted);
            }
            *started = true;
        }

        let stream = match TcpStream::connect(&self.addr).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(addr = %self.addr, error = %e, "failed to connect");
                self.finished.cancel();
                return Err(e.into());
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }
        info!(addr = %self.addr, "connected");

        let connection = Connection::new(
            CLIENT_CONNECTION_ID,
            stream,
            self.addr.clone(),
            self.factory.create_session(),
            self.config,
            shutdown,
        );
        let handle = connection.handle();
        self.running.lock().handle = Some(handle);

        let running = Arc::clone(&self.running);
        let finished = self.finished.clone();
        let task = tokio::spawn(async move {
            connection.run().await;
            running.lock().handle = None;
            finished.cancel();
            debug!(connection_id = CLIENT_CONNECTION_ID, "client connection exited");
        });
        self.running.lock().task = Some(task);
        Ok(())
    }

    /// Tear the connection down and wait for it to finish
    pub async fn stop(&self) {
        let (handle, task) = {
            let mut running = self.running.lock();
            (running.handle.clone(), running.task.take())
        };
        if let Some(handle) = handle {
            handle.stop();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "client connection task panicked");
            }
        }
    }

    /// Live connection, if any
    pub fn connection(&self) -> Option<ConnectionHandle<F::Session>> {
        self.running.lock().handle.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// Resolves once the connection has fully terminated
    ///
    /// Resolves immediately if the client never connected.
    pub async fn closed(&self) {
        if !*self.started.lock() {
            return;
        }
        self.finished.cancelled().await;
    }
}
