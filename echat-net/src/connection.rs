//! One framed stream and the tasks that drive it
//!
//! A running connection has three activities sharing one cancellation token:
//! - a write task draining the outbound queue through [`WireCodec`]
//! - a read task pushing decoded frames onto the inbound queue
//! - the dispatch loop, sole owner of the session, which merges inbound
//!   frames, scheduler deliveries and heartbeat ticks

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use echat_protocol::{ByteOrder, Envelope, Payload, WireCodec};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::scheduler::{Delivery, ScheduleKind, Scheduler, SchedulerCallback};
use crate::session::Session;
use crate::NetError;

/// Outbound queue capacity; overflowing it closes the connection
pub const SEND_QUEUE_CAPACITY: usize = 10240;

/// Inbound queue capacity
pub const RECV_QUEUE_CAPACITY: usize = 10240;

/// Floor for the heartbeat check interval
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
    pub byte_order: ByteOrder,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            byte_order: ByteOrder::default(),
        }
    }
}

impl ConnectionConfig {
    /// Heartbeat interval clamped to [`MIN_HEARTBEAT_INTERVAL`]
    pub fn effective_heartbeat(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }
}

struct Shared<S> {
    id: u32,
    peer: String,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    scheduler: Scheduler<S>,
}

/// Clonable reference to a connection
///
/// Usable from any task: sessions keep one to send and schedule, other
/// sessions keep one to broadcast.
pub struct ConnectionHandle<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for ConnectionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for ConnectionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("peer", &self.shared.peer)
            .field("stopped", &self.shared.cancel.is_cancelled())
            .finish()
    }
}

impl<S: 'static> ConnectionHandle<S> {
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// Remote address label
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Queue one frame payload without waiting
    ///
    /// A full queue closes the connection instead of applying backpressure.
    /// Returns false if the payload was not queued.
    pub fn send(&self, data: Bytes) -> bool {
        if self.is_stopped() {
            return false;
        }

        match self.shared.outbound.try_send(data) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let err = NetError::QueueOverflow {
                    connection_id: self.shared.id,
                    capacity: SEND_QUEUE_CAPACITY,
                };
                warn!(
                    connection_id = self.shared.id,
                    peer = %self.shared.peer,
                    error = %err,
                    "closing connection"
                );
                self.stop();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Pack and queue an envelope
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.pack() {
            Ok(data) => self.send(data),
            Err(e) => {
                warn!(
                    connection_id = self.shared.id,
                    message_id = envelope.message_id,
                    error = %e,
                    "failed to pack envelope"
                );
                false
            }
        }
    }

    /// Encode a typed payload and queue it
    pub fn send_message<P: Payload>(&self, payload: &P) -> bool {
        match payload.to_envelope() {
            Ok(envelope) => self.send_envelope(&envelope),
            Err(e) => {
                warn!(
                    connection_id = self.shared.id,
                    message_id = P::ID.as_u32(),
                    error = %e,
                    "failed to encode message"
                );
                false
            }
        }
    }

    /// Request shutdown; idempotent
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn closed(&self) {
        self.shared.cancel.cancelled().await;
    }

    /// Run `callback` on the dispatch loop after `period` (and every
    /// `period` for repeating entries)
    pub fn schedule_task(
        &self,
        period: Duration,
        kind: ScheduleKind,
        callback: SchedulerCallback<S>,
    ) -> Result<u64, NetError> {
        self.shared.scheduler.schedule(period, kind, callback)
    }

    pub fn unschedule_task(&self, schedule_id: u64) -> Result<(), NetError> {
        self.shared.scheduler.unschedule(schedule_id)
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }
}

/// A stream bound to a session, ready to [`run`](Connection::run)
pub struct Connection<S: Session, T> {
    handle: ConnectionHandle<S>,
    stream: T,
    session: S,
    config: ConnectionConfig,
    outbound_rx: mpsc::Receiver<Bytes>,
    deliveries: mpsc::Receiver<Delivery<S>>,
}

impl<S, T> Connection<S, T>
where
    S: Session,
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Create a connection whose lifetime is bounded by `parent`
    pub fn new(
        id: u32,
        stream: T,
        peer: impl Into<String>,
        session: S,
        config: ConnectionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let (scheduler, deliveries) = Scheduler::new(&cancel);
        let (outbound, outbound_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);

        Self {
            handle: ConnectionHandle {
                shared: Arc::new(Shared {
                    id,
                    peer: peer.into(),
                    outbound,
                    cancel,
                    scheduler,
                }),
            },
            stream,
            session,
            config,
            outbound_rx,
            deliveries,
        }
    }

    pub fn handle(&self) -> ConnectionHandle<S> {
        self.handle.clone()
    }

    /// Drive the connection until it stops
    ///
    /// `Session::uninitialized` runs after every task has exited. If
    /// `Session::initialize` fails no I/O is started and `uninitialized` is
    /// not called.
    pub async fn run(self) {
        let Connection {
            handle,
            stream,
            mut session,
            config,
            outbound_rx,
            mut deliveries,
        } = self;
        let id = handle.id();

        info!(connection_id = id, peer = %handle.peer(), "connection started");

        if let Err(e) = session.initialize(handle.clone()) {
            error!(connection_id = id, peer = %handle.peer(), error = %e, "session initialization failed");
            handle.stop();
            handle.shared.scheduler.shutdown().await;
            return;
        }

        let codec = WireCodec::new(id, config.byte_order);
        let (reader, writer) = tokio::io::split(stream);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(RECV_QUEUE_CAPACITY);

        let write_task = tokio::spawn(write_loop(
            FramedWrite::new(writer, codec),
            outbound_rx,
            handle.clone(),
        ));
        let read_task = tokio::spawn(read_loop(
            FramedRead::new(reader, codec),
            inbound_tx,
            handle.clone(),
        ));

        let period = config.effective_heartbeat();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancel = handle.cancel_token().clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(frame) = inbound_rx.recv() => {
                    session.on_recv_message(frame);
                }
                Some(delivery) = deliveries.recv() => {
                    if delivery.is_cancelled() {
                        debug!(connection_id = id, schedule_id = delivery.schedule_id(), "dropping cancelled delivery");
                    } else {
                        delivery.call(&mut session);
                    }
                }
                _ = heartbeat.tick() => {
                    if !session.check_heartbeat() {
                        info!(connection_id = id, error = %NetError::HeartbeatTimeout(id), "closing connection");
                        handle.stop();
                    }
                }
            }
        }

        handle.stop();
        handle.shared.scheduler.shutdown().await;
        for (name, task) in [("read", read_task), ("write", write_task)] {
            if let Err(e) = task.await {
                warn!(connection_id = id, task = name, error = %e, "connection task panicked");
            }
        }

        session.uninitialized();
        info!(connection_id = id, peer = %handle.peer(), "connection closed");
    }
}

async fn read_loop<T, S>(
    mut frames: FramedRead<ReadHalf<T>, WireCodec>,
    inbound: mpsc::Sender<Bytes>,
    handle: ConnectionHandle<S>,
) where
    T: AsyncRead + Send + 'static,
    S: 'static,
{
    let id = handle.id();
    let cancel = handle.cancel_token().clone();

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(payload)) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = inbound.send(payload) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                info!(connection_id = id, error = %e, "read failed");
                handle.stop();
                break;
            }
            None => {
                info!(connection_id = id, "peer closed the connection");
                handle.stop();
                break;
            }
        }
    }
    debug!(connection_id = id, "read task exited");
}

async fn write_loop<T, S>(
    mut frames: FramedWrite<WriteHalf<T>, WireCodec>,
    mut outbound: mpsc::Receiver<Bytes>,
    handle: ConnectionHandle<S>,
) where
    T: AsyncWrite + Send + 'static,
    S: 'static,
{
    let id = handle.id();
    let cancel = handle.cancel_token().clone();

    loop {
        let data = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            data = outbound.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = frames.send(data) => result,
        };
        if let Err(e) = result {
            info!(connection_id = id, error = %e, "write failed");
            handle.stop();
            break;
        }
    }
    debug!(connection_id = id, "write task exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Session for Quiet {
        fn initialize(&mut self, _connection: ConnectionHandle<Self>) -> Result<(), NetError> {
            Ok(())
        }

        fn uninitialized(&mut self) {}

        fn on_recv_message(&mut self, _data: Bytes) {}

        fn check_heartbeat(&mut self) -> bool {
            true
        }
    }

    fn idle_connection() -> (Connection<Quiet, tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(64);
        let root = CancellationToken::new();
        let connection = Connection::new(
            4,
            local,
            "duplex",
            Quiet,
            ConnectionConfig::default(),
            &root,
        );
        (connection, remote)
    }

    #[tokio::test]
    async fn test_send_queue_overflow_closes_connection() {
        let (connection, _remote) = idle_connection();
        let handle = connection.handle();

        for _ in 0..SEND_QUEUE_CAPACITY {
            assert!(handle.send(Bytes::from_static(b"x")));
        }
        assert!(!handle.is_stopped());

        assert!(!handle.send(Bytes::from_static(b"overflow")));
        assert!(handle.is_stopped());
        assert!(!handle.send(Bytes::from_static(b"after")));
    }

    #[tokio::test]
    async fn test_send_after_stop_returns_false() {
        let (connection, _remote) = idle_connection();
        let handle = connection.handle();

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(!handle.send(Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn test_handle_identity() {
        let (connection, _remote) = idle_connection();
        let handle = connection.handle();
        assert_eq!(handle.id(), 4);
        assert_eq!(handle.peer(), "duplex");
        assert!(format!("{:?}", handle).contains("duplex"));
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_handle() {
        let (local, _remote) = tokio::io::duplex(64);
        let root = CancellationToken::new();
        let connection = Connection::new(1, local, "p", Quiet, ConnectionConfig::default(), &root);
        let handle = connection.handle();

        root.cancel();
        assert!(handle.is_stopped());
        handle.closed().await;
    }

    #[test]
    fn test_heartbeat_floor() {
        let config = ConnectionConfig {
            heartbeat_interval: Duration::from_millis(10),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.effective_heartbeat(), MIN_HEARTBEAT_INTERVAL);

        let config = ConnectionConfig {
            heartbeat_interval: Duration::from_secs(7),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.effective_heartbeat(), Duration::from_secs(7));
    }
}
