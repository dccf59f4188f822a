use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::context::AppContext;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 后台任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// 启动期服务令牌获取
    CredentialAcquisition,
    /// 清理空闲的客户端限流桶
    RateLimitPrune,
}

/// 后台任务集合
///
/// 任务在构建时启动，`shutdown` 时统一中止。请求处理路径从不等待这些任务。
#[derive(Debug, Default)]
pub struct AppTasks {
    handles: Vec<(TaskType, JoinHandle<()>)>,
}

impl AppTasks {
    /// 启动所有后台任务
    #[must_use]
    pub fn spawn(context: &AppContext) -> Self {
        let mut handles = Vec::new();

        if let Some(handle) = context.credentials.spawn_startup_acquisition() {
            handles.push((TaskType::CredentialAcquisition, handle));
        }

        let rate_limit = &context.config.rate_limit;
        if rate_limit.enabled && rate_limit.per_client {
            let idle = Duration::from_secs(rate_limit.client_idle_secs.max(1));
            handles.push((
                TaskType::RateLimitPrune,
                tokio::spawn(prune_loop(Arc::clone(&context.rate_limiter), idle)),
            ));
        }

        Self { handles }
    }

    #[must_use]
    pub fn running(&self) -> Vec<TaskType> {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(task, _)| *task)
            .collect()
    }

    /// 中止所有仍在运行的任务
    pub fn shutdown(self) {
        for (task, handle) in self.handles {
            if !handle.is_finished() {
                handle.abort();
                linfo!(
                    "system",
                    LogStage::Shutdown,
                    LogComponent::Main,
                    "task_aborted",
                    &format!("后台任务已中止: {task:?}")
                );
            }
        }
    }
}

async fn prune_loop(limiter: Arc<crate::proxy::RateLimiter>, idle: Duration) {
    let mut ticker = tokio::time::interval(idle);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let pruned = limiter.prune_idle(idle);
        if pruned > 0 {
            ldebug!(
                "system",
                LogStage::Admission,
                LogComponent::RateLimiter,
                "prune_idle_clients",
                "清理空闲客户端限流桶",
                pruned = pruned,
                remaining = limiter.tracked_clients()
            );
        }
    }
}
