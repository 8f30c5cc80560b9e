use anyhow::Context;
use order_service::{Config, Server, init_logger_from_env};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 加载 .env (可选)
    let _ = dotenv::dotenv();

    // 2. 加载配置 + 日志
    init_logger_from_env();
    let config = Config::from_env();

    tracing::info!("Order service starting...");

    // 3. 启动 HTTP 服务器 (Server::run 会初始化状态并启动后台任务)
    let server = Server::new(config);
    server.run().await.context("order service failed")?;

    tracing::info!("Order service stopped");
    Ok(())
}
