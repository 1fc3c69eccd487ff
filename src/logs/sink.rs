/// Log sink: persist every entry, then fan it out to live subscribers
///
/// One broadcast channel per resource, created when the first subscriber
/// arrives. Append and broadcast happen under a per-resource lock so
/// subscribers see entries in id order; resources never wait on each other. Slow subscribers lose entries rather than stall the
/// engine; they can re-read history through the paginated log.

use crate::error::LogStoreError;
use crate::flow::types::ResourceId;
use crate::logs::store::LogStore;
use crate::logs::types::{LogEntry, NewLogEntry};
use dashmap::DashMap;
use futures::Stream;
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Message delivered on a live subscription
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    Entry(LogEntry),
    Keepalive,
}

impl LiveMessage {
    /// Wire form: the entry itself, or `{"keepalive": true}`
    pub fn to_json(&self) -> Value {
        match self {
            LiveMessage::Entry(entry) => serde_json::to_value(entry).unwrap_or(Value::Null),
            LiveMessage::Keepalive => json!({ "keepalive": true }),
        }
    }
}

pub struct LogSink {
    store: Arc<dyn LogStore>,
    channels: DashMap<ResourceId, broadcast::Sender<LiveMessage>>,
    write_locks: DashMap<ResourceId, Arc<Mutex<()>>>,
    buffer: usize,
}

impl LogSink {
    pub fn new(store: Arc<dyn LogStore>, buffer: usize) -> Self {
        Self {
            store,
            channels: DashMap::new(),
            write_locks: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Persist `entry` and push it to the resource's live subscribers
    pub async fn emit(&self, entry: NewLogEntry) -> Result<LogEntry, LogStoreError> {
        let lock = Arc::clone(self.write_locks.entry(entry.resource_id).or_default().value());
        let _guard = lock.lock().await;
        let stored = self.store.append(entry).await?;

        if let Some(tx) = self.channels.get(&stored.resource_id) {
            // No receivers is fine; the channel gets pruned on the next tick
            let _ = tx.send(LiveMessage::Entry(stored.clone()));
        }

        tracing::debug!(
            "📝 Log {} [{}] run={} node={:?}",
            stored.id,
            stored.log_type.as_str(),
            stored.flow_run_id,
            stored.node_id
        );
        Ok(stored)
    }

    /// Open a live subscription; only entries emitted after this call are delivered
    pub fn subscribe(&self, resource_id: ResourceId) -> LogSubscription {
        let rx = self
            .channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe();

        tracing::debug!("🔌 Live log subscriber attached for resource {}", resource_id);
        LogSubscription {
            resource_id,
            inner: BroadcastStream::new(rx),
        }
    }

    /// Live subscribers currently attached to a resource
    pub fn subscriber_count(&self, resource_id: ResourceId) -> usize {
        self.channels
            .get(&resource_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Drop channels without subscribers and ping the rest
    pub fn keepalive_tick(&self) {
        self.channels.retain(|resource_id, tx| {
            let alive = tx.receiver_count() > 0;
            if !alive {
                tracing::debug!("🧹 Pruned idle live channel for resource {}", resource_id);
            }
            alive
        });

        for channel in self.channels.iter() {
            let _ = channel.value().send(LiveMessage::Keepalive);
        }
    }

    /// Run [`keepalive_tick`](Self::keepalive_tick) every `interval`
    pub fn spawn_keepalive(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sink = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sink.keepalive_tick();
            }
        })
    }
}

/// Ordered stream of live messages for one resource
///
/// Ends only when the sink is dropped. Entries missed because the subscriber
/// fell behind are skipped with a warning.
pub struct LogSubscription {
    resource_id: ResourceId,
    inner: BroadcastStream<LiveMessage>,
}

impl LogSubscription {
    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Next message, `None` once the sink is gone
    pub async fn recv(&mut self) -> Option<LiveMessage> {
        self.next().await
    }
}

impl Stream for LogSubscription {
    type Item = LiveMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => return Poll::Ready(Some(message)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(
                        "⚠️ Live subscriber for resource {} lagged, skipped {} messages",
                        self.resource_id,
                        skipped
                    );
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::store::MemoryLogStore;
    use crate::logs::types::LogType;
    use pretty_assertions::assert_eq;

    fn entry(resource_id: ResourceId, run: &str) -> NewLogEntry {
        NewLogEntry {
            resource_id,
            flow_run_id: run.into(),
            node_id: None,
            log_type: LogType::FlowStart,
            payload: Value::Null,
        }
    }

    fn sink(buffer: usize) -> LogSink {
        LogSink::new(Arc::new(MemoryLogStore::new()), buffer)
    }

    #[tokio::test]
    async fn subscribers_only_see_their_resource_in_id_order() {
        let sink = sink(16);
        let mut sub = sink.subscribe(1);

        sink.emit(entry(1, "a")).await.unwrap();
        sink.emit(entry(2, "b")).await.unwrap();
        sink.emit(entry(1, "c")).await.unwrap();

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        match (first, second) {
            (LiveMessage::Entry(a), LiveMessage::Entry(c)) => {
                assert_eq!((a.flow_run_id.as_str(), c.flow_run_id.as_str()), ("a", "c"));
                assert!(a.id < c.id);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test]
    async fn keepalive_reaches_subscribers_and_prunes_idle_channels() {
        let sink = sink(16);
        let mut sub = sink.subscribe(1);
        drop(sink.subscribe(2));

        sink.keepalive_tick();

        assert_eq!(sub.recv().await, Some(LiveMessage::Keepalive));
        assert_eq!(sink.subscriber_count(1), 1);
        assert!(sink.channels.get(&2).is_none());
        assert_eq!(LiveMessage::Keepalive.to_json(), json!({ "keepalive": true }));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_but_keeps_order() {
        let sink = sink(2);
        let mut sub = sink.subscribe(1);

        for run in ["r1", "r2", "r3", "r4"] {
            sink.emit(entry(1, run)).await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..2 {
            if let Some(LiveMessage::Entry(e)) = sub.recv().await {
                seen.push(e.flow_run_id);
            }
        }
        assert_eq!(seen, vec!["r3".to_string(), "r4".to_string()]);
    }

    /// Holds appends for resource 1 until released
    struct GatedStore {
        inner: MemoryLogStore,
        gate: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl LogStore for GatedStore {
        async fn append(&self, entry: NewLogEntry) -> Result<LogEntry, LogStoreError> {
            if entry.resource_id == 1 {
                self.gate.notified().await;
            }
            self.inner.append(entry).await
        }

        async fn page(
            &self,
            resource_id: ResourceId,
            request: crate::logs::types::PageRequest,
        ) -> Result<crate::logs::types::LogPage, LogStoreError> {
            self.inner.page(resource_id, request).await
        }

        async fn run_entries(&self, flow_run_id: &str) -> Result<Vec<LogEntry>, LogStoreError> {
            self.inner.run_entries(flow_run_id).await
        }

        async fn delete_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, LogStoreError> {
            self.inner.delete_older_than(cutoff).await
        }
    }

    #[tokio::test]
    async fn slow_resource_does_not_hold_up_others() {
        let store = Arc::new(GatedStore {
            inner: MemoryLogStore::new(),
            gate: tokio::sync::Notify::new(),
        });
        let sink = Arc::new(LogSink::new(store.clone(), 16));

        let blocked = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.emit(entry(1, "slow")).await })
        };
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(Duration::from_secs(1), sink.emit(entry(2, "fast")))
            .await
            .expect("resource 2 waited on resource 1")
            .unwrap();
        assert!(!blocked.is_finished());

        store.gate.notify_one();
        let slow = blocked.await.unwrap().unwrap();
        assert!(other.id < slow.id);
    }

    #[tokio::test]
    async fn emit_without_subscribers_still_persists() {
        let sink = sink(4);
        let stored = sink.emit(entry(9, "x")).await.unwrap();
        let page = sink.store().run_entries("x").await.unwrap();
        assert_eq!(page, vec![stored]);
    }
}
