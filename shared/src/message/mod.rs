//! 消息总线消息类型定义
//!
//! 这些类型在 HTTP 门面进程和服务响应进程之间共享，
//! 通过内存代理或 TCP 代理传输。
//!
//! # Wire format
//!
//! A transport record carries opaque bytes. Order-service puts a JSON
//! [`Envelope`] in those bytes:
//!
//! ```json
//! { "request_id": "…uuid…", "correlation_id": null, "payload": "5" }
//! ```
//!
//! Replies echo the request's `request_id` as `correlation_id` and carry a
//! tagged [`Reply`] as payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod payload;
pub use payload::*;

/// 总线消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: Uuid,
    /// Set on replies: the `request_id` of the request being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// 创建请求消息
    pub fn request<T: Serialize + ?Sized>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            request_id: Uuid::new_v4(),
            correlation_id: None,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// 创建响应消息 (关联到请求)
    pub fn reply(correlation_id: Uuid, reply: &Reply) -> Result<Self, serde_json::Error> {
        Ok(Self {
            request_id: Uuid::new_v4(),
            correlation_id: Some(correlation_id),
            payload: serde_json::to_value(reply)?,
        })
    }

    /// Whether this envelope answers the request `request_id`
    pub fn answers(&self, request_id: Uuid) -> bool {
        self.correlation_id == Some(request_id)
    }

    /// 解析载荷为指定类型
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// 序列化为二进制
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 从二进制解析
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_has_no_correlation() {
        let msg = Envelope::request(&"5").unwrap();
        assert!(!msg.request_id.is_nil());
        assert!(msg.correlation_id.is_none());
        assert_eq!(msg.parse_payload::<String>().unwrap(), "5");
    }

    #[test]
    fn test_reply_answers_request() {
        let request = Envelope::request(&"b563feb7b2b84b6test").unwrap();
        let reply = Envelope::reply(request.request_id, &Reply::failure("not found")).unwrap();

        assert!(reply.answers(request.request_id));
        assert!(!reply.answers(Uuid::new_v4()));
        assert_ne!(reply.request_id, request.request_id);
    }

    #[test]
    fn test_bytes_conversion() {
        let original = Envelope::request(&2u32).unwrap();
        let bytes = original.to_bytes().unwrap();
        let recovered = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(recovered, original);
        assert_eq!(recovered.parse_payload::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_malformed_bytes_rejected() {
        assert!(Envelope::from_bytes(b"\"Order 1 is not found\"").is_err());
    }
}
