//! Memory 传输层实现 (同进程通信)
//!
//! Every topic is a `tokio::sync::broadcast` channel plus a bounded log of
//! the most recent records. Publishing and subscribing on one topic take the
//! same lock, so a subscriber opened at [`StartPosition::Latest`] sees
//! exactly the records published after `subscribe` returned.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{Consumer, Producer, Record, StartPosition, Subscription};
use crate::message::error::TransportError;

/// Memory broker tuning
#[derive(Debug, Clone)]
pub struct MemoryBrokerConfig {
    /// Capacity of each topic's broadcast channel (default: 1024)
    pub channel_capacity: usize,
    /// Records retained per topic for `Earliest` replay (default: 1024)
    pub retention: usize,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            retention: 1024,
        }
    }
}

/// What travels on a topic channel
#[derive(Debug, Clone)]
enum Delivery {
    Record(Arc<Record>),
    Fault(String),
}

struct TopicState {
    sender: broadcast::Sender<Delivery>,
    retained: VecDeque<Arc<Record>>,
    next_offset: u64,
}

/// In-process topic broker
///
/// Cheap to clone; all clones share the same topics. Implements both
/// [`Producer`] and [`Consumer`].
#[derive(Clone)]
pub struct MemoryBroker {
    topics: Arc<DashMap<String, Arc<Mutex<TopicState>>>>,
    config: MemoryBrokerConfig,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topics", &self.topics.len())
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MemoryBroker {
    /// 创建默认配置的内存代理
    pub fn new() -> Self {
        Self::from_config(MemoryBrokerConfig::default())
    }

    pub fn from_config(config: MemoryBrokerConfig) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            config: MemoryBrokerConfig {
                channel_capacity: config.channel_capacity.max(1),
                retention: config.retention,
            },
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn topic(&self, name: &str) -> Arc<Mutex<TopicState>> {
        if let Some(existing) = self.topics.get(name) {
            return Arc::clone(existing.value());
        }
        let capacity = self.config.channel_capacity;
        let entry = self.topics.entry(name.to_string()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(capacity);
            Arc::new(Mutex::new(TopicState {
                sender,
                retained: VecDeque::new(),
                next_offset: 0,
            }))
        });
        Arc::clone(entry.value())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Append a record and fan it out to current subscribers
    pub fn publish_record(&self, topic: &str, payload: Vec<u8>) -> Result<u64, TransportError> {
        self.ensure_open()?;

        let state = self.topic(topic);
        let mut state = state.lock();
        let offset = state.next_offset;
        state.next_offset += 1;

        let record = Arc::new(Record {
            topic: topic.to_string(),
            offset,
            payload,
        });
        if self.config.retention > 0 {
            if state.retained.len() == self.config.retention {
                state.retained.pop_front();
            }
            state.retained.push_back(Arc::clone(&record));
        }

        // No receivers is fine: the record is still retained
        let receivers = state.sender.send(Delivery::Record(record)).unwrap_or(0);
        tracing::trace!(topic = %topic, offset, receivers, "Record published");
        Ok(offset)
    }

    /// Open a subscription without going through the async trait
    pub fn subscribe_topic(
        &self,
        topic: &str,
        start: StartPosition,
    ) -> Result<MemorySubscription, TransportError> {
        self.ensure_open()?;

        let state = self.topic(topic);
        let state = state.lock();
        let backlog = match start {
            StartPosition::Latest => VecDeque::new(),
            StartPosition::Earliest => state.retained.clone(),
        };
        let receiver = state.sender.subscribe();

        tracing::debug!(topic = %topic, start = %start, "Subscription opened");
        Ok(MemorySubscription {
            topic: topic.to_string(),
            backlog,
            receiver,
        })
    }

    /// Deliver a delivery error to every current subscriber of `topic`
    ///
    /// Returns how many subscriptions were notified.
    pub fn inject_fault(&self, topic: &str, reason: impl Into<String>) -> usize {
        let state = self.topic(topic);
        let state = state.lock();
        state
            .sender
            .send(Delivery::Fault(reason.into()))
            .unwrap_or(0)
    }

    /// Live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|state| state.lock().sender.receiver_count())
            .unwrap_or(0)
    }

    /// Records still retained for `topic`
    pub fn retained_len(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|state| state.lock().retained.len())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the broker: every subscription ends, later calls fail
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(topics = self.topics.len(), "Shutting down memory broker");
            // Dropping the senders ends every receiver
            self.topics.clear();
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<u64, TransportError> {
        self.publish_record(topic, payload).map_err(|e| match e {
            TransportError::Closed => TransportError::Publish("broker closed".to_string()),
            other => other,
        })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown();
        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryBroker {
    async fn subscribe(
        &self,
        topic: &str,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        let subscription = self.subscribe_topic(topic, start).map_err(|e| match e {
            TransportError::Closed => TransportError::Subscribe("broker closed".to_string()),
            other => other,
        })?;
        Ok(Box::new(subscription))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown();
        Ok(())
    }
}

/// Subscription on a [`MemoryBroker`] topic
pub struct MemorySubscription {
    topic: String,
    /// Retained records still to replay (`Earliest` only)
    backlog: VecDeque<Arc<Record>>,
    receiver: broadcast::Receiver<Delivery>,
}

impl MemorySubscription {
    pub async fn recv(&mut self) -> Option<Result<Record, TransportError>> {
        if let Some(record) = self.backlog.pop_front() {
            return Some(Ok(Record::clone(&record)));
        }

        match self.receiver.recv().await {
            Ok(Delivery::Record(record)) => Some(Ok(Record::clone(&record))),
            Ok(Delivery::Fault(reason)) => Some(Err(TransportError::Delivery(reason))),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(topic = %self.topic, skipped, "Subscriber lagged");
                Some(Err(TransportError::Lagged(skipped)))
            }
            Err(RecvError::Closed) => None,
        }
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self) -> Option<Result<Record, TransportError>> {
        self.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_sees_only_new_records() {
        let broker = MemoryBroker::new();
        broker.publish_record("t", b"old".to_vec()).unwrap();

        let mut sub = broker.subscribe_topic("t", StartPosition::Latest).unwrap();
        broker.publish_record("t", b"new".to_vec()).unwrap();

        let record = sub.recv().await.unwrap().unwrap();
        assert_eq!(record.payload, b"new");
        assert_eq!(record.offset, 1);
    }

    #[tokio::test]
    async fn test_earliest_replays_retained_then_live() {
        let broker = MemoryBroker::new();
        broker.publish_record("t", b"a".to_vec()).unwrap();
        broker.publish_record("t", b"b".to_vec()).unwrap();

        let mut sub = broker.subscribe_topic("t", StartPosition::Earliest).unwrap();
        broker.publish_record("t", b"c".to_vec()).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(sub.recv().await.unwrap().unwrap().payload);
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_retention_is_bounded() {
        let broker = MemoryBroker::from_config(MemoryBrokerConfig {
            channel_capacity: 16,
            retention: 2,
        });
        for i in 0..5u8 {
            broker.publish_record("t", vec![i]).unwrap();
        }
        assert_eq!(broker.retained_len("t"), 2);

        let mut sub = broker.subscribe_topic("t", StartPosition::Earliest).unwrap();
        assert_eq!(sub.recv().await.unwrap().unwrap().payload, vec![3]);
        assert_eq!(sub.recv().await.unwrap().unwrap().payload, vec![4]);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let broker = MemoryBroker::new();
        let sub = broker.subscribe_topic("t", StartPosition::Latest).unwrap();
        assert_eq!(broker.subscriber_count("t"), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_fault_is_delivered_as_error() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe_topic("t", StartPosition::Latest).unwrap();
        assert_eq!(broker.inject_fault("t", "partition offline"), 1);

        let err = sub.recv().await.unwrap().unwrap_err();
        assert_eq!(err, TransportError::Delivery("partition offline".to_string()));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let broker = MemoryBroker::from_config(MemoryBrokerConfig {
            channel_capacity: 2,
            retention: 0,
        });
        let mut sub = broker.subscribe_topic("t", StartPosition::Latest).unwrap();
        for i in 0..5u8 {
            broker.publish_record("t", vec![i]).unwrap();
        }

        assert!(matches!(
            sub.recv().await,
            Some(Err(TransportError::Lagged(3)))
        ));
        // Resumes at the oldest record still buffered
        assert_eq!(sub.recv().await.unwrap().unwrap().payload, vec![3]);
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe_topic("t", StartPosition::Latest).unwrap();
        broker.shutdown();

        assert!(sub.recv().await.is_none());
        assert!(broker.publish("t", b"x".to_vec()).await.is_err());
        assert!(broker.subscribe("t", StartPosition::Latest).await.is_err());
    }
}
