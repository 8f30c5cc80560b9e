//! Topic names
//!
//! Each operation owns a request topic and a response topic. The names are
//! shared with every process attached to the broker.

use std::fmt;

pub const GET_ORDER_BY_ID: &str = "get_order_by_id";
pub const GET_ORDER_BY_ID_RESPONSE: &str = "get_order_by_id_response";
pub const POST_ORDER: &str = "post_order";
pub const POST_ORDER_RESPONSE: &str = "post_order_response";

/// Request topic and the topic its replies are published on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPair {
    pub request: String,
    pub response: String,
}

impl TopicPair {
    pub fn new(request: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            response: response.into(),
        }
    }

    /// `get_order_by_id` → `get_order_by_id_response`
    pub fn get_order_by_id() -> Self {
        Self::new(GET_ORDER_BY_ID, GET_ORDER_BY_ID_RESPONSE)
    }

    /// `post_order` → `post_order_response`
    pub fn post_order() -> Self {
        Self::new(POST_ORDER, POST_ORDER_RESPONSE)
    }
}

impl fmt::Display for TopicPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.request, self.response)
    }
}
