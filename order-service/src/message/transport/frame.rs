//! Broker wire frames
//!
//! A connection is either a publishing connection (any number of
//! `Publish` → `Published`/`Rejected` exchanges) or, after a `Subscribe`, a
//! one-way stream of `Record`/`Fault` frames from the broker.

use serde::{Deserialize, Serialize};

use super::{Record, StartPosition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// client → broker
    Publish { topic: String, payload: Vec<u8> },
    /// broker → client: publish acknowledged
    Published { offset: u64 },
    /// client → broker: turn this connection into a subscription
    Subscribe { topic: String, start: StartPosition },
    /// broker → client: subscription is live
    Subscribed,
    /// broker → client: a delivery
    Record(Record),
    /// broker → client: a delivery error on a live subscription
    Fault { reason: String },
    /// broker → client: the request frame was refused
    Rejected { reason: String },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Publish { .. } => "publish",
            Frame::Published { .. } => "published",
            Frame::Subscribe { .. } => "subscribe",
            Frame::Subscribed => "subscribed",
            Frame::Record(_) => "record",
            Frame::Fault { .. } => "fault",
            Frame::Rejected { .. } => "rejected",
        }
    }
}
