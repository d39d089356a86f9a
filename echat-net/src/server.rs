//! TCP accept loop and live connection registry

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionHandle};
use crate::session::SessionFactory;
use crate::NetError;

/// Delay before retrying after consecutive transient accept errors
pub const ACCEPT_RETRY_INTERVALS: [Duration; 6] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

/// Backoff after `consecutive` transient errors in a row
///
/// The count indexes the table directly, so the first retry waits 2s.
pub fn accept_backoff(consecutive: usize) -> Duration {
    ACCEPT_RETRY_INTERVALS[consecutive.min(ACCEPT_RETRY_INTERVALS.len() - 1)]
}

/// Accept errors worth retrying rather than shutting the listener down
pub fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    if matches!(
        err.kind(),
        ConnectionAborted | ConnectionReset | Interrupted | WouldBlock | TimedOut
    ) {
        return true;
    }
    matches!(err.raw_os_error(), Some(code) if code == libc::EMFILE || code == libc::ENFILE)
}

struct RegistryInner<S> {
    next_id: u32,
    connections: HashMap<u32, ConnectionHandle<S>>,
}

/// Live connections keyed by id
struct Registry<S> {
    inner: Mutex<RegistryInner<S>>,
}

impl<S: 'static> Registry<S> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 0,
                connections: HashMap::new(),
            }),
        }
    }

    fn allocate_id(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        inner.next_id
    }

    fn insert(&self, handle: ConnectionHandle<S>) {
        self.inner.lock().connections.insert(handle.id(), handle);
    }

    fn remove(&self, id: u32) {
        if let Some(handle) = self.inner.lock().connections.remove(&id) {
            handle.stop();
        }
    }

    fn get(&self, id: u32) -> Option<ConnectionHandle<S>> {
        self.inner.lock().connections.get(&id).cloned()
    }

    fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    fn stop_all(&self) {
        for handle in self.inner.lock().connections.values() {
            handle.stop();
        }
    }
}

/// TCP server creating one session per accepted connection
pub struct Server<F: SessionFactory> {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    factory: Arc<F>,
    config: ConnectionConfig,
    registry: Arc<Registry<F::Session>>,
    cancel: Mutex<Option<CancellationToken>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl<F: SessionFactory> Server<F> {
    /// Bind the listener; accepting starts with [`Server::start`]
    pub async fn bind(
        addr: impl ToSocketAddrs,
        factory: F,
        config: ConnectionConfig,
    ) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "server listening");

        Ok(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            factory: Arc::new(factory),
            config,
            registry: Arc::new(Registry::new()),
            cancel: Mutex::new(None),
            accept_task: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Spawn the accept loop under `shutdown`
    pub fn start(&self, shutdown: &CancellationToken) -> Result<(), NetError> {
        let listener = self.listener.lock().take().ok_or(NetError::AlreadyStarted)?;
        let cancel = shutdown.child_token();
        *self.cancel.lock() = Some(cancel.clone());

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.factory),
            self.config,
            Arc::clone(&self.registry),
            cancel,
        ));
        *self.accept_task.lock() = Some(task);
        Ok(())
    }

    /// Stop accepting, stop every connection and wait for them to finish
    pub async fn stop(&self) {
        let cancel = self.cancel.lock().clone();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "accept loop panicked");
            }
        }
        info!(addr = %self.local_addr, "server stopped");
    }

    /// Resolves when the accept loop has exited on its own or been stopped
    pub async fn stopped(&self) {
        let cancel = self.cancel.lock().clone();
        if let Some(cancel) = cancel {
            cancel.cancelled().await;
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connection(&self, id: u32) -> Option<ConnectionHandle<F::Session>> {
        self.registry.get(id)
    }
}

async fn accept_loop<F: SessionFactory>(
    listener: TcpListener,
    factory: Arc<F>,
    config: ConnectionConfig,
    registry: Arc<Registry<F::Session>>,
    cancel: CancellationToken,
) {
    info!("accept loop started");
    let mut connections = JoinSet::new();
    let mut consecutive_errors = 0usize;

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                info!("accept loop cancelled");
                break;
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "connection task panicked");
                }
                continue;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                consecutive_errors = 0;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                }

                let id = registry.allocate_id();
                let connection = Connection::new(
                    id,
                    stream,
                    peer.to_string(),
                    factory.create_session(),
                    config,
                    &cancel,
                );
                registry.insert(connection.handle());
                debug!(connection_id = id, peer = %peer, "connection accepted");

                let registry = Arc::clone(&registry);
                connections.spawn(async move {
                    connection.run().await;
                    registry.remove(id);
                    debug!(connection_id = id, "connection task exited");
                });
            }
            Err(e) if is_transient(&e) => {
                consecutive_errors += 1;
                let delay = accept_backoff(consecutive_errors);
                warn!(error = %e, consecutive_errors, ?delay, "transient accept error, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                error!(error = %e, "accept failed, stopping accept loop");
                break;
            }
        }
    }

    drop(listener);
    cancel.cancel();
    registry.stop_all();
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "connection task panicked");
        }
    }
    info!("accept loop exited");
}
