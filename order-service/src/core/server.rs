//! HTTP 服务器
//!
//! Startup order: state → background tasks (responders subscribe here) →
//! HTTP listener. Shutdown runs in reverse: HTTP drains, tasks stop, then the
//! bus closes its transport handles.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::core::tasks::BackgroundTasks;
use crate::core::{Config, Result, ServerState};

/// 访问日志
async fn access_log(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        target: "http_access",
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    response
}

/// All API routes, state not yet attached
pub fn build_app() -> Router<ServerState> {
    Router::new()
        .merge(crate::api::index::router())
        .merge(crate::api::health::router())
        .merge(crate::api::orders::router())
}

/// Routes + state + middleware, ready to serve
pub fn build_router(state: ServerState) -> Router {
    build_app()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(access_log))
}

/// 订单服务进程
pub struct Server {
    config: Config,
    /// Prebuilt state; built from `config` on start otherwise
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    /// 运行直到 Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl-C received, shutting down");
        })
        .await
    }

    /// 运行直到 `signal` 完成
    pub async fn run_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = match self.state.clone() {
            Some(state) => state,
            None => ServerState::initialize(&self.config).await?,
        };

        let mut tasks = BackgroundTasks::with_token(state.bus.shutdown_token().child_token());
        state.start_background_tasks(&mut tasks).await?;

        let listener =
            TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.http_port)))
                .await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            cache_capacity = self.config.cache_capacity.get(),
            responders = state.store.is_some(),
            "Order service listening"
        );

        let served = axum::serve(listener, build_router(state.clone()))
            .with_graceful_shutdown(signal)
            .await;

        tasks.shutdown(self.config.shutdown_timeout()).await;
        state.bus.shutdown().await;

        Ok(served?)
    }
}
