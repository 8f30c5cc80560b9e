//! 首页路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | / | GET | 服务名称、版本和可用接口 |

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/", get(index))
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    service: &'static str,
    version: &'static str,
    routes: &'static [RouteInfo],
}

#[derive(Debug, Serialize)]
pub struct RouteInfo {
    method: &'static str,
    path: &'static str,
    description: &'static str,
}

const ROUTES: &[RouteInfo] = &[
    RouteInfo {
        method: "GET",
        path: "/order/{order_uid}",
        description: "Fetch an order, cache first",
    },
    RouteInfo {
        method: "POST",
        path: "/order/add",
        description: "Generate and store random orders, body {\"count\": n}",
    },
    RouteInfo {
        method: "GET",
        path: "/health",
        description: "Liveness and cache status",
    },
];

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        routes: ROUTES,
    })
}
