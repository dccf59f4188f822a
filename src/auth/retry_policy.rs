//! # 退避重试策略
//!
//! 启动期凭证获取使用的指数退避，策略本身是纯值对象。

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;

/// 指数退避策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次失败后的等待
    pub initial_delay: Duration,
    /// 每次失败后的倍增系数
    pub multiplier: f64,
    /// 等待上限
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl BackoffPolicy {
    /// 第 `attempt` 次（从 1 开始）失败后应等待的时间
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * factor;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }

    /// 全部失败时的等待序列
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(|attempt| self.delay_for(attempt))
    }

    /// 按策略重试异步操作，返回第一次成功的结果或最后一次错误
    pub async fn retry<T, E, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    lwarn!(
                        "system",
                        LogStage::Authentication,
                        LogComponent::Credential,
                        "retry_backoff",
                        &format!("{operation_name} 第 {attempt} 次尝试失败，等待后重试: {err}"),
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
