//! Transport 传输层抽象
//!
//! 提供可插拔的传输层架构：
//! ```text
//!        ┌──────────────────────────────┐
//!        │  Producer / Consumer Traits  │  ◄── 可插拔接口
//!        └──────────────┬───────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!    MemoryBroker               TcpProducer / TcpConsumer
//!    (同进程通信)                (连接 BrokerServer)
//! ```
//!
//! A topic is an ordered log of opaque byte records. Subscriptions start at
//! the newest record ([`StartPosition::Latest`]) or replay what the broker
//! still retains ([`StartPosition::Earliest`]).

mod frame;
mod memory;
mod tcp;

pub use frame::Frame;
pub use memory::{MemoryBroker, MemoryBrokerConfig, MemorySubscription};
pub use tcp::{TcpConsumer, TcpProducer};

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::error::TransportError;

/// Frames larger than this are rejected (16 MiB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A record delivered from a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub topic: String,
    /// Position in the topic log, assigned by the broker
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Where a new subscription begins reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Only records published after subscribing
    #[default]
    Latest,
    /// Replay the retained history first
    Earliest,
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPosition::Latest => write!(f, "latest"),
            StartPosition::Earliest => write!(f, "earliest"),
        }
    }
}

impl FromStr for StartPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" | "newest" => Ok(StartPosition::Latest),
            "earliest" | "oldest" => Ok(StartPosition::Earliest),
            other => Err(format!("unknown start position: {other}")),
        }
    }
}

/// Publishing half of a transport
#[async_trait]
pub trait Producer: Send + Sync + fmt::Debug {
    /// Append `payload` to `topic`, returning the assigned offset
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<u64, TransportError>;

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Subscribing half of a transport
#[async_trait]
pub trait Consumer: Send + Sync + fmt::Debug {
    /// Open a subscription on `topic`
    ///
    /// The subscription is live when this returns: with
    /// [`StartPosition::Latest`] every record published afterwards is
    /// delivered.
    async fn subscribe(
        &self,
        topic: &str,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>, TransportError>;

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A live subscription; dropping it unsubscribes
#[async_trait]
pub trait Subscription: Send {
    fn topic(&self) -> &str;

    /// Next delivery, `None` once the topic is closed
    ///
    /// Implementations must be cancel-safe so callers can race this against
    /// a deadline or a shutdown signal.
    async fn next(&mut self) -> Option<Result<Record, TransportError>>;
}

// ========== 辅助函数 ==========

/// 从异步流中读取一帧 (`u32` LE 长度 + JSON)
///
/// Returns `Ok(None)` on a clean end of stream before the length prefix.
pub(crate) async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> Result<Option<Frame>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Io(format!("Read len failed: {}", e))),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::Codec(format!(
            "Frame of {} bytes exceeds limit",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::Io(format!("Read frame failed: {}", e)))?;

    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| TransportError::Codec(e.to_string()))
}

/// 向异步流写入一帧
pub(crate) async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), TransportError> {
    let body = serde_json::to_vec(frame).map_err(|e| TransportError::Codec(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(TransportError::Codec(format!(
            "Frame of {} bytes exceeds limit",
            body.len()
        )));
    }

    let mut data = Vec::with_capacity(4 + body.len());
    data.extend_from_slice(&(body.len() as u32).to_le_bytes());
    data.extend_from_slice(&body);

    writer
        .write_all(&data)
        .await
        .map_err(|e| TransportError::Io(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TransportError::Io(format!("Flush failed: {}", e)))?;
    Ok(())
}
