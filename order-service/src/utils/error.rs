//! 统一错误处理
//!
//! HTTP-facing error type. Every failure leaving a handler is rendered as:
//!
//! ```json
//! { "code": "E0003", "message": "Order b563feb7b2b84b6test is not found" }
//! ```
//!
//! | 错误码 | HTTP | 说明 |
//! |--------|------|------|
//! | E0002 | 400 | 验证失败 |
//! | E0003 | 404 | 资源不存在 |
//! | E9001 | 500 | 内部错误 |
//! | E9003 | 502 | 消息总线不可用 |
//! | E9004 | 504 | 等待响应超时 |

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::message::BridgeError;

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// 错误码
    pub code: String,
    /// 消息
    pub message: String,
}

/// 应用错误枚举
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== 业务逻辑错误 (4xx) ==========
    #[error("Resource not found: {0}")]
    /// 资源不存在 (404)
    NotFound(String),

    #[error("Validation failed: {0}")]
    /// 验证失败 (400)
    Validation(String),

    // ========== 系统错误 (5xx) ==========
    #[error("Upstream timeout: {0}")]
    /// 响应超时 (504)
    Timeout(String),

    #[error("Upstream unavailable: {0}")]
    /// 消息总线错误 (502)
    Upstream(String),

    #[error("Internal server error: {0}")]
    /// 内部错误 (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Not found (404)
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "E0003", msg.as_str()),

            // Validation (400)
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "E0002", msg.as_str()),

            // Gateway timeout (504)
            AppError::Timeout(msg) => {
                error!(target: "bus", error = %msg, "Timed out waiting for response");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "E9004",
                    "Timed out waiting for response",
                )
            }

            // Bad gateway (502)
            AppError::Upstream(msg) => {
                error!(target: "bus", error = %msg, "Message bus error");
                (StatusCode::BAD_GATEWAY, "E9003", "Message bus unavailable")
            }

            // Internal errors (500)
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "E9001",
                    "Internal server error",
                )
            }
        };

        let body = Json(ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        match e {
            // The responder's failure text is the answer
            BridgeError::Remote(reason) => AppError::NotFound(reason),
            BridgeError::Timeout(_) => AppError::Timeout(e.to_string()),
            BridgeError::Transport(_) => AppError::Upstream(e.to_string()),
            BridgeError::Encode(_) | BridgeError::Decode(_) => AppError::Internal(e.to_string()),
        }
    }
}

// ========== Helper Constructors ==========

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::TransportError;
    use std::time::Duration;

    #[test]
    fn test_bridge_error_mapping() {
        let status = |e: BridgeError| AppError::from(e).into_response().status();

        assert_eq!(
            status(BridgeError::Remote("Order 1 is not found".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(BridgeError::Timeout(Duration::from_secs(10))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(BridgeError::Transport(TransportError::Closed)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(BridgeError::Decode("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_remote_reason_is_kept() {
        match AppError::from(BridgeError::Remote("Order 1 is not found".into())) {
            AppError::NotFound(msg) => assert_eq!(msg, "Order 1 is not found"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
