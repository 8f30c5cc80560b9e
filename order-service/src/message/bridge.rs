//! 同步请求/响应桥 (基于发布/订阅)
//!
//! Turns one publish on a request topic plus one reply on the paired response
//! topic into a single awaitable call bounded by a deadline.
//!
//! ```text
//! call_raw ──▶ subscribe(response) ──▶ publish(request) ──▶ wait
//!                                                           │
//!          ┌────────────────────────────────────────────────┤
//!          ▼                        ▼                       ▼
//!   matching reply            delivery error            deadline
//!   (correlation_id ==        Transport(..)             Timeout(..)
//!    request_id)
//! ```
//!
//! Replies are matched on the envelope's `correlation_id`, so any number of
//! calls may share a response topic. Records that don't answer this call
//! (other callers' replies, stale replies, garbage) are skipped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::message::{Envelope, Reply};
use tokio::time::Instant;
use uuid::Uuid;

use super::error::{BridgeError, TransportError};
use super::topics::TopicPair;
use super::transport::{Consumer, Producer, StartPosition, Subscription};

/// Default deadline for a call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// When the response subscription is opened relative to the publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeTiming {
    /// Subscribe first; a fast reply can never be missed
    #[default]
    BeforePublish,
    /// Publish first, then subscribe. A reply landing in between is only
    /// seen with [`StartPosition::Earliest`].
    AfterPublish,
}

impl std::str::FromStr for SubscribeTiming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before_publish" | "before" => Ok(SubscribeTiming::BeforePublish),
            "after_publish" | "after" => Ok(SubscribeTiming::AfterPublish),
            other => Err(format!("unknown subscribe timing: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Used by [`RequestBridge::request`]
    pub default_timeout: Duration,
    pub start_position: StartPosition,
    pub subscribe_timing: SubscribeTiming,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            start_position: StartPosition::Latest,
            subscribe_timing: SubscribeTiming::BeforePublish,
        }
    }
}

/// Request/response bridge over a producer/consumer pair
///
/// Cheap to clone; clones share the underlying transport handles.
#[derive(Debug, Clone)]
pub struct RequestBridge {
    producer: Arc<dyn Producer>,
    consumer: Arc<dyn Consumer>,
    config: BridgeConfig,
}

impl RequestBridge {
    pub fn new(producer: Arc<dyn Producer>, consumer: Arc<dyn Consumer>) -> Self {
        Self::with_config(producer, consumer, BridgeConfig::default())
    }

    pub fn with_config(
        producer: Arc<dyn Producer>,
        consumer: Arc<dyn Consumer>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            producer,
            consumer,
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Publish `payload` on `topics.request` and wait for its reply
    ///
    /// A `Reply::Failure` is returned as a value: the responder ran and the
    /// failure text is the answer. Errors are reserved for the bridge itself
    /// (transport, deadline, codec).
    pub async fn call_raw<T>(
        &self,
        payload: &T,
        topics: &TopicPair,
        timeout: Duration,
    ) -> Result<Reply, BridgeError>
    where
        T: Serialize + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        let request = Envelope::request(payload).map_err(|e| BridgeError::Encode(e.to_string()))?;
        let bytes = request
            .to_bytes()
            .map_err(|e| BridgeError::Encode(e.to_string()))?;

        let pending = tokio::time::timeout_at(deadline, self.send(request.request_id, topics, bytes))
            .await
            .map_err(|_| {
                tracing::warn!(topic = %topics.request, request_id = %request.request_id, "Deadline expired while sending request");
                BridgeError::Timeout(timeout)
            })??;

        pending.wait(deadline, timeout).await
    }

    /// Typed call: decodes a success value into `R`, failure → [`BridgeError::Remote`]
    pub async fn call<T, R>(
        &self,
        payload: &T,
        topics: &TopicPair,
        timeout: Duration,
    ) -> Result<R, BridgeError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        match self.call_raw(payload, topics, timeout).await? {
            Reply::Success { value } => {
                serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))
            }
            Reply::Failure { reason } => Err(BridgeError::Remote(reason)),
        }
    }

    /// [`call`](Self::call) with the configured default timeout
    pub async fn request<T, R>(&self, payload: &T, topics: &TopicPair) -> Result<R, BridgeError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call(payload, topics, self.config.default_timeout).await
    }

    async fn send(
        &self,
        request_id: Uuid,
        topics: &TopicPair,
        bytes: Vec<u8>,
    ) -> Result<PendingCall, BridgeError> {
        let subscription = match self.config.subscribe_timing {
            SubscribeTiming::BeforePublish => {
                let subscription = self.subscribe(topics).await?;
                // On publish failure the subscription drops right here
                self.publish(request_id, topics, bytes).await?;
                subscription
            }
            SubscribeTiming::AfterPublish => {
                self.publish(request_id, topics, bytes).await?;
                self.subscribe(topics).await?
            }
        };

        Ok(PendingCall {
            request_id,
            response_topic: topics.response.clone(),
            subscription,
        })
    }

    async fn subscribe(&self, topics: &TopicPair) -> Result<Box<dyn Subscription>, BridgeError> {
        self.consumer
            .subscribe(&topics.response, self.config.start_position)
            .await
            .map_err(|e| {
                tracing::error!(topic = %topics.response, error = %e, "Failed to subscribe to response topic");
                BridgeError::Transport(e)
            })
    }

    async fn publish(
        &self,
        request_id: Uuid,
        topics: &TopicPair,
        bytes: Vec<u8>,
    ) -> Result<(), BridgeError> {
        match self.producer.publish(&topics.request, bytes).await {
            Ok(offset) => {
                tracing::debug!(topic = %topics.request, request_id = %request_id, offset, "Request published");
                Ok(())
            }
            Err(e) => {
                tracing::error!(topic = %topics.request, request_id = %request_id, error = %e, "Failed to publish request");
                Err(BridgeError::Transport(e))
            }
        }
    }
}

/// One in-flight call; dropping it releases the response subscription
struct PendingCall {
    request_id: Uuid,
    response_topic: String,
    subscription: Box<dyn Subscription>,
}

impl PendingCall {
    async fn wait(mut self, deadline: Instant, timeout: Duration) -> Result<Reply, BridgeError> {
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => {
                    tracing::warn!(topic = %self.response_topic, request_id = %self.request_id, "Response timeout expired");
                    return Err(BridgeError::Timeout(timeout));
                }

                delivery = self.subscription.next() => match delivery {
                    None => return Err(BridgeError::Transport(TransportError::Closed)),
                    Some(Err(e)) => {
                        tracing::warn!(topic = %self.response_topic, request_id = %self.request_id, error = %e, "Delivery error while awaiting response");
                        return Err(BridgeError::Transport(e));
                    }
                    Some(Ok(record)) => {
                        if let Some(reply) = self.accept(&record.payload)? {
                            return Ok(reply);
                        }
                    }
                },
            }
        }
    }

    /// `Some` if the record answers this call
    fn accept(&self, bytes: &[u8]) -> Result<Option<Reply>, BridgeError> {
        let envelope = match Envelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(topic = %self.response_topic, error = %e, "Discarding malformed response");
                return Ok(None);
            }
        };

        if !envelope.answers(self.request_id) {
            tracing::debug!(
                topic = %self.response_topic,
                request_id = %self.request_id,
                correlation_id = ?envelope.correlation_id,
                "Discarding response for another request"
            );
            return Ok(None);
        }

        let reply = envelope
            .parse_payload::<Reply>()
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        tracing::debug!(topic = %self.response_topic, request_id = %self.request_id, success = reply.is_success(), "Response received");
        Ok(Some(reply))
    }
}
