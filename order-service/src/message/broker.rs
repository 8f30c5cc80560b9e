//! TCP 代理服务器
//!
//! Exposes a [`MemoryBroker`] to other processes:
//! - 监听连接
//! - `Publish` 帧写入主题并回复 `Published`
//! - `Subscribe` 帧把连接切换为单向推送
//!
//! A subscription connection ends when the client disconnects, the topic is
//! closed or the server shuts down.

use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::error::TransportError;
use super::transport::{Frame, MemoryBroker, MemorySubscription, read_frame, write_frame};

/// Serves a [`MemoryBroker`] over TCP
#[derive(Debug, Clone)]
pub struct BrokerServer {
    broker: MemoryBroker,
    shutdown: CancellationToken,
}

impl BrokerServer {
    pub fn new(broker: MemoryBroker, shutdown: CancellationToken) -> Self {
        Self { broker, shutdown }
    }

    /// Bind `addr` and serve until shutdown
    pub async fn listen(self, addr: &str) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Main accept loop
    pub async fn serve(self, listener: TcpListener) -> Result<(), TransportError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Broker TCP server listening on {}", addr);
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Broker TCP server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::debug!("Client connected: {}", addr);
                            self.spawn_client_handler(stream, addr);
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn a new task to handle client connection
    fn spawn_client_handler(&self, stream: TcpStream, addr: SocketAddr) {
        let broker = self.broker.clone();
        let shutdown = self.shutdown.clone();
        let _ = stream.set_nodelay(true);

        tokio::spawn(async move {
            if let Err(e) = handle_client_connection(stream, addr, broker, shutdown).await {
                tracing::debug!("Client {} handler finished: {}", addr, e);
            }
        });
    }
}

/// Handle a single client connection
async fn handle_client_connection(
    stream: TcpStream,
    addr: SocketAddr,
    broker: MemoryBroker,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = read_frame(&mut reader) => frame?,
        };
        let Some(frame) = frame else {
            tracing::debug!("Client {} disconnected", addr);
            return Ok(());
        };

        match frame {
            Frame::Publish { topic, payload } => {
                let reply = match broker.publish_record(&topic, payload) {
                    Ok(offset) => Frame::Published { offset },
                    Err(e) => Frame::Rejected {
                        reason: e.to_string(),
                    },
                };
                write_frame(&mut writer, &reply).await?;
            }
            Frame::Subscribe { topic, start } => match broker.subscribe_topic(&topic, start) {
                Ok(subscription) => {
                    write_frame(&mut writer, &Frame::Subscribed).await?;
                    tracing::debug!(topic = %topic, start = %start, "Client {} subscribed", addr);
                    return stream_subscription(reader, writer, subscription, shutdown).await;
                }
                Err(e) => {
                    let reply = Frame::Rejected {
                        reason: e.to_string(),
                    };
                    write_frame(&mut writer, &reply).await?;
                }
            },
            other => {
                let reply = Frame::Rejected {
                    reason: format!("unexpected {} frame", other.kind()),
                };
                write_frame(&mut writer, &reply).await?;
            }
        }
    }
}

/// Push deliveries to a subscribed client until either side goes away
async fn stream_subscription(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut subscription: MemorySubscription,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    // Subscribed clients send nothing; a read only completes on disconnect
    let mut scratch = [0u8; 1];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),

            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => return Ok(()),
                Ok(_) => continue,
            },

            delivery = subscription.recv() => {
                let frame = match delivery {
                    Some(Ok(record)) => Frame::Record(record),
                    Some(Err(TransportError::Delivery(reason))) => Frame::Fault { reason },
                    Some(Err(e)) => Frame::Fault { reason: e.to_string() },
                    None => return Ok(()),
                };
                write_frame(&mut writer, &frame).await?;
            }
        }
    }
}
