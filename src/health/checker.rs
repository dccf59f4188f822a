//! # 后端健康探测
//!
//! 通过各后端自己的连接池客户端访问健康检查路径。探测结果只用于展示，
//! 不影响熔断器状态。

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tokio::time::{Instant, timeout};

use crate::proxy::ConnectionPool;

/// 探测状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Up,
    Down,
}

/// 单个后端的探测结果
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub url: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(rename = "latency_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 后端健康检查器
#[derive(Debug, Clone, Copy)]
pub struct HealthChecker {
    probe_timeout: Duration,
}

impl HealthChecker {
    #[must_use]
    pub const fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// 并发探测所有后端，结果按服务名排序
    pub async fn probe_all(&self, pool: &ConnectionPool) -> Vec<ServiceHealth> {
        let probes = pool
            .service_names()
            .into_iter()
            .map(|service| self.probe(pool, service));
        join_all(probes).await
    }

    async fn probe(&self, pool: &ConnectionPool, service: &str) -> ServiceHealth {
        let Some(client) = pool.client(service) else {
            return ServiceHealth {
                service: service.to_string(),
                url: String::new(),
                status: ProbeStatus::Down,
                http_status: None,
                latency: Duration::ZERO,
                error: Some("连接池中没有该服务".to_string()),
            };
        };

        let url = client.health_url();
        let start = Instant::now();
        let result = timeout(self.probe_timeout, client.http().get(&url).send()).await;
        let latency = start.elapsed();

        let (status, http_status, error) = match result {
            Ok(Ok(response)) if response.status().is_success() => {
                (ProbeStatus::Up, Some(response.status().as_u16()), None)
            }
            Ok(Ok(response)) => (
                ProbeStatus::Down,
                Some(response.status().as_u16()),
                Some(format!("健康检查返回 {}", response.status())),
            ),
            Ok(Err(e)) => (ProbeStatus::Down, None, Some(format!("请求失败: {e}"))),
            Err(_) => (
                ProbeStatus::Down,
                None,
                Some(format!("{}ms 内无响应", self.probe_timeout.as_millis())),
            ),
        };

        ServiceHealth {
            service: service.to_string(),
            url,
            status,
            http_status,
            latency,
            error,
        }
    }
}
