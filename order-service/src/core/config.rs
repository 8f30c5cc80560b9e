use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::message::{BridgeConfig, MemoryBrokerConfig, StartPosition, SubscribeTiming};

/// 服务配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | DATA_DIR | ./data | redb 数据目录 |
/// | CACHE_CAPACITY | 1000 | LRU 缓存容量 (≥ 1) |
/// | BRIDGE_TIMEOUT_MS | 10000 | 请求等待响应的超时(毫秒) |
/// | BRIDGE_START_POSITION | latest | 响应订阅起点: latest / earliest |
/// | BRIDGE_SUBSCRIBE_TIMING | before_publish | 或 after_publish |
/// | BROKER_ADDR | - | 连接远程代理; 未设置时使用进程内代理 |
/// | BROKER_LISTEN_ADDR | - | 通过 TCP 暴露进程内代理 |
/// | BROKER_RETENTION | 1024 | 每个主题保留的消息数 |
/// | RUN_RESPONDERS | true | 是否在本进程运行服务响应器 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | 关闭超时时间(毫秒) |
///
/// `LOG_LEVEL` / `LOG_DIR` are read by [`init_logger_from_env`] before the
/// config is loaded, so rejected values here are logged.
///
/// [`init_logger_from_env`]: crate::utils::logger::init_logger_from_env
///
/// # 示例
///
/// ```ignore
/// HTTP_PORT=8080 BROKER_LISTEN_ADDR=0.0.0.0:9092 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 数据目录 (orders.redb)
    pub data_dir: PathBuf,
    pub cache_capacity: NonZeroUsize,
    /// 请求桥配置
    pub bridge_timeout_ms: u64,
    pub bridge_start_position: StartPosition,
    pub bridge_subscribe_timing: SubscribeTiming,
    /// 远程代理地址
    pub broker_addr: Option<String>,
    /// 进程内代理的 TCP 监听地址
    pub broker_listen_addr: Option<String>,
    pub broker_retention: usize,
    pub run_responders: bool,
    /// 关闭超时时间 (毫秒)
    pub shutdown_timeout_ms: u64,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值 (无法解析时记录警告)
    pub fn from_env() -> Self {
        Self {
            http_port: parse_env("HTTP_PORT").unwrap_or(3000),
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".into())
                .into(),
            cache_capacity: parse_env("CACHE_CAPACITY").unwrap_or(DEFAULT_CACHE_CAPACITY),
            bridge_timeout_ms: parse_env("BRIDGE_TIMEOUT_MS").unwrap_or(10_000),
            bridge_start_position: parse_env("BRIDGE_START_POSITION").unwrap_or_default(),
            bridge_subscribe_timing: parse_env("BRIDGE_SUBSCRIBE_TIMING").unwrap_or_default(),
            broker_addr: non_empty_env("BROKER_ADDR"),
            broker_listen_addr: non_empty_env("BROKER_LISTEN_ADDR"),
            broker_retention: parse_env("BROKER_RETENTION").unwrap_or(1024),
            run_responders: parse_env("RUN_RESPONDERS").unwrap_or(true),
            shutdown_timeout_ms: parse_env("SHUTDOWN_TIMEOUT_MS").unwrap_or(10_000),
        }
    }

    /// 测试用配置: 进程内代理, 所有默认值, 数据放在 `data_dir`
    pub fn for_tests(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            http_port: 0,
            data_dir: data_dir.into(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            bridge_timeout_ms: 2_000,
            bridge_start_position: StartPosition::Latest,
            bridge_subscribe_timing: SubscribeTiming::BeforePublish,
            broker_addr: None,
            broker_listen_addr: None,
            broker_retention: 1024,
            run_responders: true,
            shutdown_timeout_ms: 2_000,
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            default_timeout: Duration::from_millis(self.bridge_timeout_ms),
            start_position: self.bridge_start_position,
            subscribe_timing: self.bridge_subscribe_timing,
        }
    }

    pub fn broker_config(&self) -> MemoryBrokerConfig {
        MemoryBrokerConfig {
            retention: self.broker_retention,
            ..MemoryBrokerConfig::default()
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("orders.redb")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    non_empty_env(key).and_then(|raw| parse_value(key, &raw))
}

/// Parse an explicitly set value; a rejected one is logged and dropped
fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring invalid environment value, using default");
            None
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
