//! # 出站连接池
//!
//! 每个后端服务一个复用的 `reqwest::Client`，并用信号量限制对单个后端的并发。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{AppConfig, PoolConfig};
use crate::error::{ProxyError, Result};

/// 单个后端的客户端
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    base_url: String,
    health_path: String,
}

impl ServiceClient {
    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.client
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_path)
    }
}

/// 出站许可：持有期间占用后端的一个并发名额
#[derive(Debug)]
pub struct PooledLease {
    pub client: reqwest::Client,
    _permit: OwnedSemaphorePermit,
}

/// 连接池快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub base_url: String,
    pub max_concurrency: usize,
    pub in_flight: usize,
}

/// 连接池
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    clients: HashMap<String, ServiceClient>,
    acquire_timeout: Duration,
}

fn build_client(config: &PoolConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(config.request_timeout())
        .tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs))
        // 3xx 原样转交调用方
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ProxyError::config_with_source("创建出站HTTP客户端失败", e))
}

impl ConnectionPool {
    /// 为每个配置的后端建立客户端
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let clients = config
            .services
            .iter()
            .map(|service| {
                let max_concurrency = config.pool.max_concurrency_per_host;
                let client = ServiceClient {
                    client: build_client(&config.pool)?,
                    permits: Arc::new(Semaphore::new(max_concurrency)),
                    max_concurrency,
                    base_url: service.base_url.trim_end_matches('/').to_string(),
                    health_path: service.health_path.clone(),
                };
                Ok((service.name.clone(), client))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            clients,
            acquire_timeout: config.pool.request_timeout(),
        })
    }

    #[must_use]
    pub fn client(&self, service: &str) -> Option<&ServiceClient> {
        self.clients.get(service)
    }

    /// 获取某个后端的出站许可
    ///
    /// 等待并发名额的时间受请求超时约束，超时视为上游不可用。
    pub async fn acquire(&self, service: &str) -> Result<PooledLease> {
        let entry = self
            .clients
            .get(service)
            .ok_or_else(|| ProxyError::internal(format!("连接池中没有服务: {service}")))?;

        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&entry.permits).acquire_owned(),
        )
        .await
        .map_err(|e| {
            ProxyError::upstream_not_available_with_source(
                format!("等待 {service} 并发名额超时"),
                e,
            )
        })?
        .map_err(|e| ProxyError::internal_with_source("连接池信号量已关闭", e))?;

        Ok(PooledLease {
            client: entry.client.clone(),
            _permit: permit,
        })
    }

    /// 已配置的服务名，按名称排序
    #[must_use]
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, PoolStats> {
        self.clients
            .iter()
            .map(|(name, client)| {
                let stats = PoolStats {
                    base_url: client.base_url.clone(),
                    max_concurrency: client.max_concurrency,
                    in_flight: client
                        .max_concurrency
                        .saturating_sub(client.permits.available_permits()),
                };
                (name.clone(), stats)
            })
            .collect()
    }

    /// 关闭所有信号量，之后的 `acquire` 立即失败
    pub fn close(&self) {
        for client in self.clients.values() {
            client.permits.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn pool_with(max_concurrency: usize) -> ConnectionPool {
        let mut config = AppConfig::default();
        config.pool.max_concurrency_per_host = max_concurrency;
        config.pool.request_timeout_secs = 1;
        for name in ["job-service", "auth-service"] {
            config.services.push(ServiceConfig {
                name: name.to_string(),
                base_url: format!("http://{name}:8080/"),
                health_path: "/health".to_string(),
                breaker_key: None,
            });
        }
        ConnectionPool::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_one_client_per_service() {
        let pool = pool_with(4);
        assert_eq!(pool.service_names(), vec!["auth-service", "job-service"]);
        let client = pool.client("job-service").unwrap();
        assert_eq!(client.base_url(), "http://job-service:8080");
        assert_eq!(client.health_url(), "http://job-service:8080/health");
    }

    #[tokio::test]
    async fn test_lease_tracks_in_flight() {
        let pool = pool_with(4);
        let lease = pool.acquire("job-service").await.unwrap();
        assert_eq!(pool.stats()["job-service"].in_flight, 1);
        drop(lease);
        assert_eq!(pool.stats()["job-service"].in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_when_saturated() {
        let pool = pool_with(1);
        let _held = pool.acquire("job-service").await.unwrap();

        let err = pool.acquire("job-service").await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamNotAvailable { .. }));
        // 其他后端不受影响
        assert!(pool.acquire("auth-service").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_service_and_close() {
        let pool = pool_with(1);
        assert!(pool.acquire("ghost").await.is_err());
        pool.close();
        assert!(pool.acquire("job-service").await.is_err());
    }
}
