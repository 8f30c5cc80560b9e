//! TCP 传输层实现 (连接 BrokerServer)

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::{Consumer, Frame, Producer, Record, StartPosition, Subscription, read_frame, write_frame};
use crate::message::error::TransportError;

/// Deliveries buffered between the socket reader and the subscriber
const SUBSCRIPTION_BUFFER: usize = 256;

async fn dial(addr: &str) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::Connection(format!("TCP connect to {} failed: {}", addr, e)))?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Publishing connection to a broker
///
/// One connection shared by all publishers; each publish waits for the
/// broker's ack before the connection is released. A broken connection is
/// re-established on the next publish; the failed record is not resent.
///
/// The socket is taken out of the slot for the whole write/ack exchange and
/// only put back once the ack is read. A publish dropped mid-exchange (for
/// example by a deadline) takes the socket with it, so no later publish can
/// read a stale ack or write after a partial frame.
#[derive(Debug, Clone)]
pub struct TcpProducer {
    addr: String,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl TcpProducer {
    /// 连接到指定地址
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = dial(addr).await?;
        tracing::debug!(addr = %addr, "Producer connected to broker");
        Ok(Self {
            addr: addr.to_string(),
            stream: Arc::new(Mutex::new(Some(stream))),
        })
    }

    async fn exchange(stream: &mut TcpStream, frame: &Frame) -> Result<u64, TransportError> {
        write_frame(stream, frame).await?;
        match read_frame(stream).await? {
            Some(Frame::Published { offset }) => Ok(offset),
            Some(Frame::Rejected { reason }) => Err(TransportError::Publish(reason)),
            Some(other) => Err(TransportError::Codec(format!(
                "unexpected {} frame from broker",
                other.kind()
            ))),
            None => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl Producer for TcpProducer {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<u64, TransportError> {
        let mut guard = self.stream.lock().await;
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => {
                let stream = dial(&self.addr).await?;
                tracing::debug!(addr = %self.addr, "Producer reconnected to broker");
                stream
            }
        };

        let frame = Frame::Publish {
            topic: topic.to_string(),
            payload,
        };
        match Self::exchange(&mut stream, &frame).await {
            Ok(offset) => {
                *guard = Some(stream);
                Ok(offset)
            }
            // Broker refused the record; the connection itself is fine
            Err(TransportError::Publish(reason)) => {
                *guard = Some(stream);
                Err(TransportError::Publish(reason))
            }
            Err(e) => Err(TransportError::Publish(e.to_string())),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            stream
                .shutdown()
                .await
                .map_err(|e| TransportError::Io(format!("TCP close failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Opens one broker connection per subscription
#[derive(Debug, Clone)]
pub struct TcpConsumer {
    addr: String,
}

impl TcpConsumer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Consumer for TcpConsumer {
    async fn subscribe(
        &self,
        topic: &str,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        let mut stream = dial(&self.addr).await?;
        let request = Frame::Subscribe {
            topic: topic.to_string(),
            start,
        };
        write_frame(&mut stream, &request).await?;

        match read_frame(&mut stream).await? {
            Some(Frame::Subscribed) => {
                tracing::debug!(topic = %topic, start = %start, "Subscribed via broker");
                Ok(Box::new(TcpSubscription::spawn(topic, stream)))
            }
            Some(Frame::Rejected { reason }) => Err(TransportError::Subscribe(reason)),
            Some(other) => Err(TransportError::Codec(format!(
                "unexpected {} frame from broker",
                other.kind()
            ))),
            None => Err(TransportError::Subscribe("broker closed connection".to_string())),
        }
    }
}

/// Subscription streamed over a dedicated connection
///
/// A reader task owns the socket and forwards decoded deliveries, keeping
/// [`Subscription::next`] cancel-safe. Dropping the subscription aborts the
/// reader and closes the socket, which the broker treats as unsubscribe.
struct TcpSubscription {
    topic: String,
    deliveries: mpsc::Receiver<Result<Record, TransportError>>,
    reader: JoinHandle<()>,
}

impl TcpSubscription {
    fn spawn(topic: &str, stream: TcpStream) -> Self {
        let (tx, deliveries) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let reader = tokio::spawn(read_deliveries(topic.to_string(), stream, tx));
        Self {
            topic: topic.to_string(),
            deliveries,
            reader,
        }
    }
}

impl Drop for TcpSubscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl Subscription for TcpSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self) -> Option<Result<Record, TransportError>> {
        self.deliveries.recv().await
    }
}

async fn read_deliveries(
    topic: String,
    mut stream: TcpStream,
    tx: mpsc::Sender<Result<Record, TransportError>>,
) {
    loop {
        let delivery = match read_frame(&mut stream).await {
            Ok(Some(Frame::Record(record))) => Ok(record),
            Ok(Some(Frame::Fault { reason })) => Err(TransportError::Delivery(reason)),
            Ok(Some(other)) => Err(TransportError::Codec(format!(
                "unexpected {} frame on subscription",
                other.kind()
            ))),
            Ok(None) => {
                tracing::debug!(topic = %topic, "Broker closed subscription");
                return;
            }
            Err(e) => {
                // The frame boundary is lost; nothing more can be read
                tracing::debug!(topic = %topic, error = %e, "Subscription stream broken");
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        if tx.send(delivery).await.is_err() {
            return;
        }
    }
}
