//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 健康检查 + 缓存状态 |
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "cache": { "len": 3, "capacity": 1000 },
//!   "responders": true
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 状态 (ok | shutting_down)
    status: &'static str,
    version: &'static str,
    cache: CacheStatus,
    /// 本进程是否运行服务响应器
    responders: bool,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    len: usize,
    capacity: usize,
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let status = if state.bus.shutdown_token().is_cancelled() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        cache: CacheStatus {
            len: state.cache.len(),
            capacity: state.cache.capacity(),
        },
        responders: state.store.is_some(),
    })
}
