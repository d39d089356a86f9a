//! Per-connection timer registry
//!
//! Each schedule entry runs in its own task and posts a [`Delivery`] to one
//! shared channel when it fires. The owning connection drains that channel on
//! its dispatch loop, so callbacks never run concurrently with message
//! handling.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::NetError;

/// Capacity of the delivery channel shared by every entry
pub const DELIVERY_CAPACITY: usize = 10;

/// Callback invoked on the dispatch loop with the period and fire instant
pub type SchedulerCallback<S> = Arc<dyn Fn(&mut S, Duration, Instant) + Send + Sync>;

/// Whether an entry fires once or repeatedly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    Once,
    Repeating,
}

/// A fired entry waiting to run on the dispatch loop
pub struct Delivery<S> {
    schedule_id: u64,
    deliver_time: Instant,
    period: Duration,
    callback: SchedulerCallback<S>,
    cancel: CancellationToken,
}

impl<S> Delivery<S> {
    pub fn schedule_id(&self) -> u64 {
        self.schedule_id
    }

    pub fn deliver_time(&self) -> Instant {
        self.deliver_time
    }

    /// True if the entry was unscheduled after this delivery was queued
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn call(&self, session: &mut S) {
        (self.callback)(session, self.period, self.deliver_time);
    }
}

impl<S> fmt::Debug for Delivery<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("schedule_id", &self.schedule_id)
            .field("deliver_time", &self.deliver_time)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

struct Entry {
    kind: ScheduleKind,
    cancel: CancellationToken,
}

struct Inner<S> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    deliver_tx: mpsc::Sender<Delivery<S>>,
    cancel: CancellationToken,
}

/// Timer registry owned by one connection
pub struct Scheduler<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: 'static> Scheduler<S> {
    /// Create a scheduler whose entries are cancelled along with `parent`
    ///
    /// Returns the receiving end of the delivery channel, which must be
    /// drained by exactly one consumer.
    pub fn new(parent: &CancellationToken) -> (Self, mpsc::Receiver<Delivery<S>>) {
        let (deliver_tx, deliver_rx) = mpsc::channel(DELIVERY_CAPACITY);
        let scheduler = Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                deliver_tx,
                cancel: parent.child_token(),
            }),
        };
        (scheduler, deliver_rx)
    }

    /// Register a timer and return its id
    ///
    /// A `Once` entry fires after `period`; a `Repeating` entry fires every
    /// `period` until unscheduled or the scheduler stops.
    pub fn schedule(
        &self,
        period: Duration,
        kind: ScheduleKind,
        callback: SchedulerCallback<S>,
    ) -> Result<u64, NetError> {
        if kind == ScheduleKind::Repeating && period.is_zero() {
            return Err(NetError::InvalidPeriod);
        }

        let schedule_id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.inner.cancel.child_token();
        self.inner.entries.lock().insert(
            schedule_id,
            Entry {
                kind,
                cancel: cancel.clone(),
            },
        );

        let task = tokio::spawn(run_entry(
            Arc::clone(&self.inner),
            schedule_id,
            kind,
            period,
            callback,
            cancel,
        ));

        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);

        debug!(schedule_id, ?kind, ?period, "schedule added");
        Ok(schedule_id)
    }

    /// Cancel and remove an entry
    ///
    /// Deliveries of this entry that are already queued are discarded.
    pub fn unschedule(&self, schedule_id: u64) -> Result<(), NetError> {
        let entry = self
            .inner
            .entries
            .lock()
            .remove(&schedule_id)
            .ok_or(NetError::ScheduleNotFound(schedule_id))?;
        entry.cancel.cancel();
        debug!(schedule_id, kind = ?entry.kind, "schedule removed");
        Ok(())
    }

    /// Cancel and clear every entry
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.entries.lock().clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Number of live entries
    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop, then wait for every entry task to exit
    pub async fn shutdown(&self) {
        self.stop();
        let tasks: Vec<_> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "schedule task panicked");
            }
        }
    }
}

async fn run_entry<S: 'static>(
    inner: Arc<Inner<S>>,
    schedule_id: u64,
    kind: ScheduleKind,
    period: Duration,
    callback: SchedulerCallback<S>,
    cancel: CancellationToken,
) {
    let first = Instant::now() + period;

    match kind {
        ScheduleKind::Once => {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(first) => {
                    deliver(&inner, schedule_id, first, period, &callback, &cancel).await;
                }
            }
        }
        ScheduleKind::Repeating => {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    fired = ticker.tick() => {
                        if !deliver(&inner, schedule_id, fired, period, &callback, &cancel).await {
                            break;
                        }
                    }
                }
            }
        }
    }

    inner.entries.lock().remove(&schedule_id);
    debug!(schedule_id, "schedule task exited");
}

/// Post one delivery; false once the entry or its consumer is gone
async fn deliver<S>(
    inner: &Inner<S>,
    schedule_id: u64,
    deliver_time: Instant,
    period: Duration,
    callback: &SchedulerCallback<S>,
    cancel: &CancellationToken,
) -> bool {
    let delivery = Delivery {
        schedule_id,
        deliver_time,
        period,
        callback: Arc::clone(callback),
        cancel: cancel.clone(),
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = inner.deliver_tx.send(delivery) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        fired: Vec<u64>,
    }

    fn record(tag: u64) -> SchedulerCallback<Counter> {
        Arc::new(move |c: &mut Counter, _period: Duration, _at: Instant| {
            c.fired.push(tag)
        })
    }

    async fn drain(
        rx: &mut mpsc::Receiver<Delivery<Counter>>,
        counter: &mut Counter,
        window: Duration,
    ) {
        let deadline = Instant::now() + window;
        loop {
            tokio::select! {
                Some(d) = rx.recv() => {
                    if !d.is_cancelled() {
                        d.call(counter);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_exactly_once() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        let id = scheduler
            .schedule(Duration::from_secs(1), ScheduleKind::Once, record(1))
            .unwrap();
        assert_eq!(id, 1);

        drain(&mut rx, &mut counter, Duration::from_secs(5)).await;
        assert_eq!(counter.fired, vec![1]);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_fires_each_period() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        let id = scheduler
            .schedule(Duration::from_secs(1), ScheduleKind::Repeating, record(7))
            .unwrap();

        drain(&mut rx, &mut counter, Duration::from_millis(3500)).await;
        assert_eq!(counter.fired, vec![7, 7, 7]);

        scheduler.unschedule(id).unwrap();
        drain(&mut rx, &mut counter, Duration::from_secs(3)).await;
        assert_eq!(counter.fired.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_are_monotonic() {
        let root = CancellationToken::new();
        let (scheduler, _rx) = Scheduler::<Counter>::new(&root);

        let a = scheduler
            .schedule(Duration::from_secs(10), ScheduleKind::Once, record(0))
            .unwrap();
        let b = scheduler
            .schedule(Duration::from_secs(10), ScheduleKind::Once, record(0))
            .unwrap();
        assert!(b > a);
        assert_eq!(scheduler.len(), 2);
    }

    #[tokio::test]
    async fn test_unschedule_unknown_id() {
        let root = CancellationToken::new();
        let (scheduler, _rx) = Scheduler::<Counter>::new(&root);
        assert!(matches!(
            scheduler.unschedule(99),
            Err(NetError::ScheduleNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_zero_period_repeating_rejected() {
        let root = CancellationToken::new();
        let (scheduler, _rx) = Scheduler::<Counter>::new(&root);
        assert!(matches!(
            scheduler.schedule(Duration::ZERO, ScheduleKind::Repeating, record(0)),
            Err(NetError::InvalidPeriod)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_once_fires() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        scheduler
            .schedule(Duration::ZERO, ScheduleKind::Once, record(3))
            .unwrap();
        drain(&mut rx, &mut counter, Duration::from_millis(10)).await;
        assert_eq!(counter.fired, vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_delivery_discarded_after_unschedule() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        let id = scheduler
            .schedule(Duration::from_secs(1), ScheduleKind::Repeating, record(5))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Fired and queued, but not yet consumed
        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.schedule_id(), id);
        scheduler.unschedule(id).unwrap();
        assert!(delivery.is_cancelled());

        if !delivery.is_cancelled() {
            delivery.call(&mut counter);
        }
        assert!(counter.fired.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_everything() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        scheduler
            .schedule(Duration::from_secs(1), ScheduleKind::Repeating, record(1))
            .unwrap();
        scheduler
            .schedule(Duration::from_secs(2), ScheduleKind::Once, record(2))
            .unwrap();

        scheduler.shutdown().await;
        assert!(scheduler.is_stopped());
        assert!(scheduler.is_empty());

        drain(&mut rx, &mut counter, Duration::from_secs(5)).await;
        assert!(counter.fired.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_stop_never_fires() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();
        scheduler.stop();

        let id = scheduler
            .schedule(Duration::from_millis(10), ScheduleKind::Once, record(9))
            .unwrap();
        assert!(id > 0);

        drain(&mut rx, &mut counter, Duration::from_secs(1)).await;
        assert!(counter.fired.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_entries() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        scheduler
            .schedule(Duration::from_secs(1), ScheduleKind::Repeating, record(1))
            .unwrap();
        root.cancel();
        assert!(scheduler.is_stopped());

        drain(&mut rx, &mut counter, Duration::from_secs(3)).await;
        assert!(counter.fired.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_receives_period() {
        let root = CancellationToken::new();
        let (scheduler, mut rx) = Scheduler::new(&root);
        let mut counter = Counter::default();

        scheduler
            .schedule(
                Duration::from_millis(250),
                ScheduleKind::Once,
                Arc::new(|c: &mut Counter, period: Duration, _at: Instant| {
                    c.fired.push(period.as_millis() as u64)
                }),
            )
            .unwrap();

        drain(&mut rx, &mut counter, Duration::from_secs(1)).await;
        assert_eq!(counter.fired, vec![250]);
    }
}
