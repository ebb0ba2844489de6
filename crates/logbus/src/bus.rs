//! The bus itself: append, read, subscribe, summary, clear.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use slipway_core::{DeploymentId, LogEvent, LogLevel, LogQuery, LogSummary, Result};
use slipway_store::LogStore;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval};

/// Default per-subscriber buffer before drop-oldest kicks in.
pub const DEFAULT_BUFFER: usize = 256;

/// Default keepalive cadence on subscription streams.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// What a subscription yields.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// A durable log event, in append order.
    Event(LogEvent),
    /// This subscriber lagged and `missed` events were dropped for it.
    Gap {
        /// How many events this subscriber missed.
        missed: u64,
    },
    /// Periodic keepalive so idle transports stay open.
    Heartbeat,
}

struct Channel {
    tx: broadcast::Sender<LogEvent>,
    /// Next id to assign. Initialized from the durable log.
    seq: AtomicU64,
    /// Serializes appends so id order equals durable order.
    append_lock: tokio::sync::Mutex<()>,
}

/// Per-deployment bounded-ordered append log with live subscription.
pub struct LogBus {
    store: Arc<dyn LogStore>,
    channels: DashMap<DeploymentId, Arc<Channel>>,
    channel_init: tokio::sync::Mutex<()>,
    buffer: usize,
    heartbeat: Duration,
    emitted: AtomicU64,
}

impl LogBus {
    /// Create a bus over a durable log store with default tuning.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self::with_options(store, DEFAULT_BUFFER, DEFAULT_HEARTBEAT)
    }

    /// Create a bus with an explicit buffer size and heartbeat cadence.
    #[must_use]
    pub fn with_options(store: Arc<dyn LogStore>, buffer: usize, heartbeat: Duration) -> Self {
        Self {
            store,
            channels: DashMap::new(),
            channel_init: tokio::sync::Mutex::new(()),
            buffer: buffer.max(1),
            heartbeat,
            emitted: AtomicU64::new(0),
        }
    }

    async fn channel(&self, id: DeploymentId) -> Result<Arc<Channel>> {
        if let Some(channel) = self.channels.get(&id) {
            return Ok(channel.clone());
        }
        // First touch for this deployment: initialize the sequence from
        // whatever is already durable, under a lock so two racing
        // first-appends cannot double-create.
        let _guard = self.channel_init.lock().await;
        if let Some(channel) = self.channels.get(&id) {
            return Ok(channel.clone());
        }
        let last = self.store.last_id(id).await?;
        let (tx, _) = broadcast::channel(self.buffer);
        let channel = Arc::new(Channel {
            tx,
            seq: AtomicU64::new(last + 1),
            append_lock: tokio::sync::Mutex::new(()),
        });
        self.channels.insert(id, channel.clone());
        Ok(channel)
    }

    /// Append one event: assign id and timestamp, persist, then fan out.
    ///
    /// Durable once this returns. On storage failure no subscriber sees
    /// the event; callers treat that as non-fatal and continue.
    pub async fn append(
        &self,
        id: DeploymentId,
        level: LogLevel,
        message: impl Into<String>,
        step: Option<&str>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<LogEvent> {
        let channel = self.channel(id).await?;
        let _guard = channel.append_lock.lock().await;

        let event = LogEvent {
            id: channel.seq.fetch_add(1, Ordering::Relaxed),
            deployment_id: id,
            timestamp: Utc::now(),
            level,
            step: step.map(str::to_owned),
            message: message.into(),
            metadata,
        };
        self.store.append(event.clone()).await?;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // Ignore send error (no active receivers).
        let _ = channel.tx.send(event.clone());
        Ok(event)
    }

    /// Read a filtered slice of the durable log, in id order.
    pub async fn read(&self, id: DeploymentId, query: &LogQuery) -> Result<Vec<LogEvent>> {
        self.store.read(id, query).await
    }

    /// Aggregate view of one deployment's log.
    pub async fn summary(&self, id: DeploymentId) -> Result<LogSummary> {
        Ok(LogSummary::compute(&self.store.read_all(id).await?))
    }

    /// Subscribe: full replay in order, then follow new appends.
    pub async fn subscribe(&self, id: DeploymentId) -> Result<Subscription> {
        let channel = self.channel(id).await?;
        // Snapshot under the append lock so the replay boundary is
        // exact: everything after the snapshot arrives via the channel.
        let guard = channel.append_lock.lock().await;
        let backlog = self.store.read_all(id).await?;
        let rx = channel.tx.subscribe();
        drop(guard);

        let last_seen = backlog.last().map_or(0, |event| event.id);
        Ok(Subscription {
            backlog: backlog.into(),
            rx,
            last_seen,
            heartbeat: heartbeat_interval(self.heartbeat),
            closed: false,
        })
    }

    /// Remove storage and memory entries and detach subscribers.
    pub async fn clear(&self, id: DeploymentId) -> Result<()> {
        // Dropping the channel drops the sender; followers see a closed
        // stream and terminate.
        self.channels.remove(&id);
        self.store.clear(id).await
    }

    /// Events appended through this bus since creation.
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Live subscriber count for one deployment.
    #[must_use]
    pub fn subscriber_count(&self, id: DeploymentId) -> usize {
        self.channels
            .get(&id)
            .map_or(0, |channel| channel.tx.receiver_count())
    }
}

fn heartbeat_interval(period: Duration) -> Interval {
    // First tick should fire after one period, not immediately.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

/// A replay-then-follow subscription to one deployment's log.
pub struct Subscription {
    backlog: VecDeque<LogEvent>,
    rx: broadcast::Receiver<LogEvent>,
    /// Highest event id delivered, for replay/live dedup.
    last_seen: u64,
    heartbeat: Interval,
    closed: bool,
}

impl Subscription {
    /// Next message, or `None` once the stream is finished (the
    /// deployment's channel was cleared).
    pub async fn next(&mut self) -> Option<BusMessage> {
        if let Some(event) = self.backlog.pop_front() {
            self.last_seen = event.id;
            return Some(BusMessage::Event(event));
        }
        if self.closed {
            return None;
        }
        loop {
            tokio::select! {
                _ = self.heartbeat.tick() => return Some(BusMessage::Heartbeat),
                received = self.rx.recv() => match received {
                    Ok(event) => {
                        // Events already delivered via replay come
                        // through the channel again; skip them.
                        if event.id <= self.last_seen {
                            continue;
                        }
                        self.last_seen = event.id;
                        return Some(BusMessage::Event(event));
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        return Some(BusMessage::Gap { missed });
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        self.closed = true;
                        return None;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use slipway_store::MemoryLogStore;

    use super::*;

    fn bus() -> LogBus {
        LogBus::new(Arc::new(MemoryLogStore::new()))
    }

    async fn append_n(bus: &LogBus, id: DeploymentId, n: usize) {
        for i in 0..n {
            bus.append(id, LogLevel::Info, format!("event {i}"), Some("step"), BTreeMap::new())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let bus = bus();
        let id = DeploymentId::generate();
        let first = bus
            .append(id, LogLevel::Info, "a", None, BTreeMap::new())
            .await
            .unwrap();
        let second = bus
            .append(id, LogLevel::Info, "b", None, BTreeMap::new())
            .await
            .unwrap();
        assert!(second.id > first.id);
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test]
    async fn subscribe_replays_then_follows() {
        let bus = bus();
        let id = DeploymentId::generate();
        append_n(&bus, id, 3).await;

        let mut sub = bus.subscribe(id).await.unwrap();
        for expected in 1..=3u64 {
            match sub.next().await {
                Some(BusMessage::Event(event)) => assert_eq!(event.id, expected),
                other => panic!("expected replayed event, got {other:?}"),
            }
        }

        bus.append(id, LogLevel::Success, "live", None, BTreeMap::new())
            .await
            .unwrap();
        match sub.next().await {
            Some(BusMessage::Event(event)) => {
                assert_eq!(event.id, 4);
                assert_eq!(event.message, "live");
            }
            other => panic!("expected live event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_overlap_is_deduplicated() {
        let bus = bus();
        let id = DeploymentId::generate();
        // Subscribe first so replayed events are also sent live.
        let mut early = bus.subscribe(id).await.unwrap();
        append_n(&bus, id, 2).await;

        // A second subscriber replays 1..=2 from storage and must not
        // see them again from the channel.
        let mut sub = bus.subscribe(id).await.unwrap();
        bus.append(id, LogLevel::Info, "after", None, BTreeMap::new())
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            match sub.next().await {
                Some(BusMessage::Event(event)) => seen.push(event.id),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![1, 2, 3]);

        // The early subscriber saw everything exactly once too.
        let mut early_seen = Vec::new();
        for _ in 0..3 {
            match early.next().await {
                Some(BusMessage::Event(event)) => early_seen.push(event.id),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(early_seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn slow_subscriber_gets_gap_marker() {
        let store = Arc::new(MemoryLogStore::new());
        // Buffer of 4: a subscriber that never drains while many events
        // flow must lag.
        let bus = LogBus::with_options(store, 4, DEFAULT_HEARTBEAT);
        let id = DeploymentId::generate();
        let mut sub = bus.subscribe(id).await.unwrap();
        append_n(&bus, id, 12).await;

        match sub.next().await {
            Some(BusMessage::Gap { missed }) => assert!(missed > 0),
            other => panic!("expected gap, got {other:?}"),
        }
        // After the gap the live tail continues in order.
        match sub.next().await {
            Some(BusMessage::Event(event)) => assert!(event.id > 1),
            other => panic!("expected event after gap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clear_detaches_subscribers_and_storage() {
        let bus = bus();
        let id = DeploymentId::generate();
        append_n(&bus, id, 2).await;
        let mut sub = bus.subscribe(id).await.unwrap();
        // Drain the replay.
        sub.next().await;
        sub.next().await;

        bus.clear(id).await.unwrap();
        assert!(sub.next().await.is_none());
        assert!(bus.read(id, &LogQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_when_idle() {
        let store = Arc::new(MemoryLogStore::new());
        let bus = LogBus::with_options(store, DEFAULT_BUFFER, Duration::from_secs(30));
        let id = DeploymentId::generate();
        let mut sub = bus.subscribe(id).await.unwrap();

        let next = tokio::spawn(async move { sub.next().await });
        tokio::time::advance(Duration::from_secs(31)).await;
        match next.await.unwrap() {
            Some(BusMessage::Heartbeat) => {}
            other => panic!("expected heartbeat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ids_continue_after_bus_restart() {
        let store = Arc::new(MemoryLogStore::new());
        let id = DeploymentId::generate();
        {
            let bus = LogBus::new(store.clone());
            bus.append(id, LogLevel::Info, "before", None, BTreeMap::new())
                .await
                .unwrap();
        }
        let bus = LogBus::new(store);
        let event = bus
            .append(id, LogLevel::Info, "after", None, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(event.id, 2);
    }

    #[tokio::test]
    async fn summary_reflects_appends() {
        let bus = bus();
        let id = DeploymentId::generate();
        append_n(&bus, id, 2).await;
        bus.append(id, LogLevel::Error, "bad", None, BTreeMap::new())
            .await
            .unwrap();
        let summary = bus.summary(id).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_level.get("error"), Some(&1));
        assert_eq!(bus.total_emitted(), 3);
    }
}
