//! 服务器状态
//!
//! [`ServerState`] is the axum state: cheap to clone, every field is a shared
//! handle.

use crate::cache::OrderCache;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result, ServerError};
use crate::message::{BrokerServer, MemoryBroker, MessageBus, RequestBridge};
use crate::orders::{self, OrderStore};

/// 服务器状态 - 持有所有服务的共享引用
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 服务配置 |
/// | cache | 订单 LRU 缓存 |
/// | bus | 消息总线 (生产者/消费者) |
/// | bridge | 请求/响应桥 |
/// | store | 订单存储 (仅当本进程运行响应器) |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub cache: OrderCache,
    pub bus: MessageBus,
    pub bridge: RequestBridge,
    pub store: Option<OrderStore>,
}

impl ServerState {
    /// 创建服务器状态 (手动构造)
    pub fn new(config: Config, bus: MessageBus, store: Option<OrderStore>) -> Self {
        let cache = OrderCache::new(config.cache_capacity);
        let bridge = bus.bridge(config.bridge_config());
        Self {
            config,
            cache,
            bus,
            bridge,
            store,
        }
    }

    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 订单存储 (data_dir/orders.redb), 仅当 `run_responders`
    /// 2. 消息总线: `BROKER_ADDR` 指向远程代理, 否则使用进程内代理
    pub async fn initialize(config: &Config) -> Result<Self> {
        let store = if config.run_responders {
            std::fs::create_dir_all(&config.data_dir)?;
            let path = config.database_path();
            tracing::info!(path = %path.display(), "Opening order store");
            Some(OrderStore::open(path)?)
        } else {
            None
        };

        let bus = match &config.broker_addr {
            Some(addr) => MessageBus::connect(addr).await?,
            None => MessageBus::in_memory(MemoryBroker::from_config(config.broker_config())),
        };

        Ok(Self::new(config.clone(), bus, store))
    }

    /// 启动后台任务
    ///
    /// 启动的任务：
    /// - TCP 代理服务器 (设置了 `BROKER_LISTEN_ADDR` 且使用进程内代理)
    /// - 每个订单操作一个服务响应器 (`RUN_RESPONDERS`)
    ///
    /// Responders are subscribed before this returns, so requests sent
    /// afterwards are always seen.
    pub async fn start_background_tasks(&self, tasks: &mut BackgroundTasks) -> Result<()> {
        if let Some(listen_addr) = &self.config.broker_listen_addr {
            let Some(broker) = self.bus.broker() else {
                return Err(ServerError::Config(
                    "BROKER_LISTEN_ADDR requires the in-process broker (unset BROKER_ADDR)".into(),
                ));
            };
            let listener = tokio::net::TcpListener::bind(listen_addr).await?;
            let server = BrokerServer::new(broker.clone(), tasks.shutdown_token());
            tasks.spawn("broker_server", TaskKind::Worker, async move {
                if let Err(e) = server.serve(listener).await {
                    tracing::error!("Broker TCP server failed: {}", e);
                }
            });
        }

        if let Some(store) = &self.store {
            let responder = self.bus.responder();
            for (topics, operation) in orders::bindings(store) {
                let name = format!("responder:{}", topics.request);
                let worker = responder.bind(topics, operation).await?;
                let token = tasks.shutdown_token();
                tasks.spawn(name, TaskKind::Listener, async move {
                    worker.run(token).await;
                });
            }
        }

        tasks.log_summary();
        Ok(())
    }
}
