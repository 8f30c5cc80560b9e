//! Reply payload carried back on a response topic

use serde::{Deserialize, Serialize};

/// 请求结果 (成功值或失败原因)
///
/// ```json
/// {"status":"success","value":{"order_uid":"…"}}
/// {"status":"failure","reason":"Order 42 is not found"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Success { value: serde_json::Value },
    Failure { reason: String },
}

// ==================== Convenience Constructors ====================

impl Reply {
    pub fn success(value: serde_json::Value) -> Self {
        Self::Success { value }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success { .. })
    }
}
