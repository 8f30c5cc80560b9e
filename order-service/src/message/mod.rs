//! 消息总线
//!
//! Request/response over publish/subscribe:
//!
//! ```text
//!  HTTP handler                                            Responder loop
//!       │                                                       ▲
//!       ▼                                                       │
//!  RequestBridge ──publish──▶ [request topic] ──deliver─────────┘
//!       ▲                                                       │
//!       └─────deliver──── [response topic] ◀──publish reply─────┘
//! ```
//!
//! - [`transport`] - topic transport traits, in-process broker, TCP client
//! - [`broker`] - TCP server exposing an in-process broker
//! - [`bridge`] - awaitable request/response calls with a deadline
//! - [`responder`] - operation loops answering request topics
//! - [`topics`] - topic pair names

pub mod bridge;
pub mod broker;
pub mod bus;
pub mod error;
pub mod responder;
pub mod topics;
pub mod transport;

pub use bridge::{BridgeConfig, RequestBridge, SubscribeTiming};
pub use broker::BrokerServer;
pub use bus::MessageBus;
pub use error::{BridgeError, OperationError, TransportError};
pub use responder::{
    Operation, Responder, ResponderHandle, ResponderLoop, ResponderStats, operation_fn,
};
pub use shared::message::{Envelope, Reply};
pub use topics::TopicPair;
pub use transport::{
    Consumer, MemoryBroker, MemoryBrokerConfig, Producer, Record, StartPosition, Subscription,
    TcpConsumer, TcpProducer,
};
