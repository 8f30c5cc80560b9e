//! 服务响应器
//!
//! Binds an [`Operation`] to a request topic. Each decoded request runs the
//! operation once; the outcome is published on the response topic, tagged with
//! the request's id so the waiting bridge can pick it out.
//!
//! ```text
//! Idle ──spawn──▶ Listening ──request──▶ Processing ──reply──▶ Listening
//!                    │                                            │
//!                    └──────── cancel / topic closed ─────────────┴──▶ Stopped
//! ```
//!
//! Requests are handled one at a time, in delivery order.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use shared::message::{Envelope, Reply};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{OperationError, TransportError};
use super::topics::TopicPair;
use super::transport::{Consumer, Producer, Record, StartPosition, Subscription};

/// Business operation bound to a request topic
#[async_trait]
pub trait Operation: Send + Sync {
    /// Run against the request payload; `Err` text becomes the failure reason
    async fn handle(&self, payload: serde_json::Value)
    -> Result<serde_json::Value, OperationError>;
}

/// [`Operation`] backed by an async closure
pub struct FnOperation<F>(F);

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, OperationError>> + Send,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, OperationError> {
        (self.0)(payload).await
    }
}

/// Wrap an async closure as an operation
pub fn operation_fn<F, Fut>(f: F) -> Arc<dyn Operation>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, OperationError>> + Send + 'static,
{
    Arc::new(FnOperation(f))
}

/// Counters reported when a responder stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponderStats {
    /// Requests answered with a success reply
    pub handled: u64,
    /// Requests answered with a failure reply
    pub failed: u64,
    /// Requests that got no reply (malformed, or reply publish failed)
    pub dropped: u64,
    /// Delivery errors observed while listening
    pub delivery_errors: u64,
}

/// Creates responder loops on a producer/consumer pair
#[derive(Debug, Clone)]
pub struct Responder {
    producer: Arc<dyn Producer>,
    consumer: Arc<dyn Consumer>,
}

impl Responder {
    pub fn new(producer: Arc<dyn Producer>, consumer: Arc<dyn Consumer>) -> Self {
        Self { producer, consumer }
    }

    /// Subscribe to `topics.request` and return the loop, not yet running
    ///
    /// The subscription is live when this returns, so a request published
    /// afterwards is never missed. A subscribe failure is returned and no
    /// loop is created.
    pub async fn bind(
        &self,
        topics: TopicPair,
        operation: Arc<dyn Operation>,
    ) -> Result<ResponderLoop, TransportError> {
        let subscription = self
            .consumer
            .subscribe(&topics.request, StartPosition::Latest)
            .await
            .map_err(|e| {
                tracing::error!(topic = %topics.request, error = %e, "Responder failed to subscribe");
                e
            })?;

        tracing::info!(topics = %topics, "Responder listening");
        Ok(ResponderLoop {
            producer: Arc::clone(&self.producer),
            topics,
            operation,
            subscription,
            stats: ResponderStats::default(),
        })
    }

    /// Subscribe and run the loop on a tokio task
    ///
    /// The loop stops when `shutdown` (or the handle) is cancelled, or when
    /// the request topic closes.
    pub async fn spawn(
        &self,
        topics: TopicPair,
        operation: Arc<dyn Operation>,
        shutdown: CancellationToken,
    ) -> Result<ResponderHandle, TransportError> {
        let worker = self.bind(topics.clone(), operation).await?;
        let token = shutdown.child_token();
        let task = tokio::spawn(worker.run(token.clone()));

        Ok(ResponderHandle {
            topics,
            token,
            task: Some(task),
        })
    }
}

/// A bound responder loop
pub struct ResponderLoop {
    producer: Arc<dyn Producer>,
    topics: TopicPair,
    operation: Arc<dyn Operation>,
    subscription: Box<dyn Subscription>,
    stats: ResponderStats,
}

impl ResponderLoop {
    pub fn topics(&self) -> &TopicPair {
        &self.topics
    }

    /// Serve until cancelled or the request topic closes
    pub async fn run(mut self, shutdown: CancellationToken) -> ResponderStats {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(topics = %self.topics, "Responder stopping");
                    break;
                }

                delivery = self.subscription.next() => match delivery {
                    Some(Ok(record)) => self.process(record).await,
                    Some(Err(e)) => {
                        self.stats.delivery_errors += 1;
                        tracing::warn!(topic = %self.topics.request, error = %e, "Delivery error, still listening");
                    }
                    None => {
                        tracing::info!(topic = %self.topics.request, "Request topic closed, responder stopping");
                        break;
                    }
                },
            }
        }

        tracing::info!(
            topics = %self.topics,
            handled = self.stats.handled,
            failed = self.stats.failed,
            dropped = self.stats.dropped,
            "Responder stopped"
        );
        self.stats
    }

    async fn process(&mut self, record: Record) {
        let request = match Envelope::from_bytes(&record.payload) {
            Ok(request) => request,
            Err(e) => {
                // No request id, nobody to answer
                self.stats.dropped += 1;
                tracing::warn!(topic = %self.topics.request, offset = record.offset, error = %e, "Dropping malformed request");
                return;
            }
        };
        let request_id = request.request_id;
        tracing::debug!(topic = %self.topics.request, request_id = %request_id, "Request received");

        let reply = match self.operation.handle(request.payload).await {
            Ok(value) => Reply::success(value),
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Operation failed");
                Reply::failure(e.to_string())
            }
        };
        let success = reply.is_success();

        let bytes = match Envelope::reply(request_id, &reply).and_then(|envelope| envelope.to_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.dropped += 1;
                tracing::error!(request_id = %request_id, error = %e, "Failed to encode reply");
                return;
            }
        };

        match self.producer.publish(&self.topics.response, bytes).await {
            Ok(_) => {
                if success {
                    self.stats.handled += 1;
                } else {
                    self.stats.failed += 1;
                }
                tracing::debug!(topic = %self.topics.response, request_id = %request_id, success, "Reply published");
            }
            Err(e) => {
                self.stats.dropped += 1;
                tracing::error!(topic = %self.topics.response, request_id = %request_id, error = %e, "Failed to publish reply");
            }
        }
    }
}

/// Handle to a spawned responder; dropping it stops the loop
pub struct ResponderHandle {
    topics: TopicPair,
    token: CancellationToken,
    task: Option<JoinHandle<ResponderStats>>,
}

impl ResponderHandle {
    pub fn topics(&self) -> &TopicPair {
        &self.topics
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Cancel the loop and wait for it to exit
    pub async fn stop(mut self) -> ResponderStats {
        self.token.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                tracing::error!(topics = %self.topics, error = ?e, "Responder task panicked");
                ResponderStats::default()
            }),
            None => ResponderStats::default(),
        }
    }
}

impl Drop for ResponderHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
