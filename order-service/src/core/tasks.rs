//! 后台任务管理
//!
//! 服务响应器和 TCP 代理服务器都以后台任务运行，共享一个取消令牌。
//!
//! # 任务类型
//!
//! - [`TaskKind::Worker`] - 长期后台工作者 (TCP 代理服务器)
//! - [`TaskKind::Listener`] - 主题监听器 (服务响应器)

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Worker,
    Listener,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Worker => "worker",
            TaskKind::Listener => "listener",
        })
    }
}

struct TaskEntry {
    name: String,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// 后台任务管理器
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// let token = tasks.shutdown_token();
///
/// tasks.spawn("responder:get_order_by_id", TaskKind::Listener, async move {
///     worker.run(token).await;
/// });
///
/// tasks.shutdown(Duration::from_secs(10)).await;
/// ```
pub struct BackgroundTasks {
    entries: Vec<TaskEntry>,
    token: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// 挂在外部令牌上 (例如消息总线的子令牌)
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            entries: Vec::new(),
            token,
        }
    }

    /// 任务内部用来监听关闭信号的令牌
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 启动一个受监管的任务
    ///
    /// Panics are caught and logged instead of tearing down the runtime. A
    /// task that returns before shutdown was requested is logged as a warning.
    pub fn spawn<F>(&mut self, name: impl Into<String>, kind: TaskKind, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let supervised = supervise(name.clone(), kind, self.token.clone(), future);

        tracing::debug!(task = %name, kind = %kind, "Background task spawned");
        self.entries.push(TaskEntry {
            name,
            kind,
            handle: tokio::spawn(supervised),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn log_summary(&self) {
        let listeners = self
            .entries
            .iter()
            .filter(|entry| entry.kind == TaskKind::Listener)
            .count();
        tracing::info!(
            total = self.entries.len(),
            workers = self.entries.len() - listeners,
            listeners,
            "Background tasks running"
        );
    }

    /// 已经退出的任务数量 (运行期间应为 0)
    pub fn check_health(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.handle.is_finished())
            .inspect(|entry| {
                tracing::error!(task = %entry.name, kind = %entry.kind, "Background task is no longer running");
            })
            .count()
    }

    /// 取消所有任务并在 `timeout` 内等待它们退出
    ///
    /// The timeout is shared by all tasks; stragglers are aborted.
    pub async fn shutdown(self, timeout: Duration) {
        tracing::info!(tasks = self.entries.len(), "Stopping background tasks");
        self.token.cancel();

        let deadline = tokio::time::Instant::now() + timeout;
        for mut entry in self.entries {
            match tokio::time::timeout_at(deadline, &mut entry.handle).await {
                Ok(Ok(())) => tracing::debug!(task = %entry.name, "Background task exited"),
                Ok(Err(e)) => tracing::error!(task = %entry.name, error = ?e, "Background task join failed"),
                Err(_) => {
                    tracing::warn!(task = %entry.name, ?timeout, "Background task ignored shutdown, aborting");
                    entry.handle.abort();
                }
            }
        }

        tracing::info!("Background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

async fn supervise<F>(name: String, kind: TaskKind, token: CancellationToken, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(()) if token.is_cancelled() => {}
        Ok(()) => {
            tracing::warn!(task = %name, kind = %kind, "Background task exited before shutdown");
        }
        Err(payload) => {
            tracing::error!(
                task = %name,
                kind = %kind,
                panic = %panic_message(payload.as_ref()),
                "Background task panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
