//! 消息总线 - 传输句柄的持有者
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │              MessageBus               │
//! │  Arc<dyn Producer>  Arc<dyn Consumer> │
//! └──────────┬─────────────────┬──────────┘
//!            ▼                 ▼
//!      RequestBridge       Responder
//!      (HTTP 门面)          (服务端)
//! ```
//!
//! The transport pair is acquired once at startup and shared by every bridge
//! and responder.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::bridge::{BridgeConfig, RequestBridge};
use super::error::TransportError;
use super::responder::Responder;
use super::transport::{Consumer, MemoryBroker, Producer, TcpConsumer, TcpProducer};

/// Shared producer/consumer pair
#[derive(Debug, Clone)]
pub struct MessageBus {
    producer: Arc<dyn Producer>,
    consumer: Arc<dyn Consumer>,
    /// Set when the bus runs its own broker
    broker: Option<MemoryBroker>,
    shutdown_token: CancellationToken,
}

impl MessageBus {
    /// Bus on a fresh in-process broker
    pub fn in_memory(broker: MemoryBroker) -> Self {
        Self {
            producer: Arc::new(broker.clone()),
            consumer: Arc::new(broker.clone()),
            broker: Some(broker),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Bus attached to a remote broker at `addr`
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let producer = TcpProducer::connect(addr).await?;
        tracing::info!(addr = %addr, "Message bus connected to broker");
        Ok(Self::from_parts(
            Arc::new(producer),
            Arc::new(TcpConsumer::new(addr)),
        ))
    }

    /// Bus on arbitrary transport handles
    pub fn from_parts(producer: Arc<dyn Producer>, consumer: Arc<dyn Consumer>) -> Self {
        Self {
            producer,
            consumer,
            broker: None,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn producer(&self) -> Arc<dyn Producer> {
        Arc::clone(&self.producer)
    }

    pub fn consumer(&self) -> Arc<dyn Consumer> {
        Arc::clone(&self.consumer)
    }

    /// The in-process broker, if this bus owns one
    pub fn broker(&self) -> Option<&MemoryBroker> {
        self.broker.as_ref()
    }

    pub fn bridge(&self, config: BridgeConfig) -> RequestBridge {
        RequestBridge::with_config(self.producer(), self.consumer(), config)
    }

    pub fn responder(&self) -> Responder {
        Responder::new(self.producer(), self.consumer())
    }

    /// 获取关闭令牌 (用于监控关闭信号)
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// 优雅关闭消息总线
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down message bus");
        self.shutdown_token.cancel();
        if let Err(e) = self.producer.close().await {
            tracing::warn!(error = %e, "Failed to close producer");
        }
        if let Err(e) = self.consumer.close().await {
            tracing::warn!(error = %e, "Failed to close consumer");
        }
    }
}
