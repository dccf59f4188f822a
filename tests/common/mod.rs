//! 集成测试共用的网关构建工具

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use serde_json::Value;
use tower::ServiceExt;

use service_gateway::app::AppContext;
use service_gateway::auth::IdentityClient;
use service_gateway::config::{AppConfig, RouteConfig, ServiceConfig};
use service_gateway::error::{ProxyError, Result};
use service_gateway::management::{AppState, build_router};

pub const SERVICE_TOKEN: &str = "svc-token-0123456789";

/// 固定返回同一个令牌的身份服务
#[derive(Debug, Default)]
pub struct StaticIdentity {
    pub logins: AtomicUsize,
    pub fail: bool,
}

impl StaticIdentity {
    pub fn failing() -> Self {
        Self {
            logins: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl IdentityClient for StaticIdentity {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn login(&self) -> Result<String> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProxyError::authentication("identity service down"));
        }
        Ok(SERVICE_TOKEN.to_string())
    }
}

/// 最小可用配置：凭证启用，限流宽松
pub fn base_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.credential.service_secret = "test-secret".to_string();
    config.credential.service_id = "central-brain".to_string();
    config.credential.service_name = "Central Brain".to_string();
    config.rate_limit.requests_per_second = 10_000.0;
    config.rate_limit.burst = 10_000;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.reset_timeout_secs = 60;
    config.pool.connect_timeout_secs = 1;
    config.pool.request_timeout_secs = 5;
    config
}

pub fn add_service(config: &mut AppConfig, name: &str, base_url: &str, breaker_key: &str) {
    config.services.push(ServiceConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        health_path: "/health".to_string(),
        breaker_key: Some(breaker_key.to_string()),
    });
}

pub fn add_route(
    config: &mut AppConfig,
    service: &str,
    prefix: &str,
    target: Option<&str>,
    rewrite: &[(&str, &str)],
) {
    config.routes.push(RouteConfig {
        service: service.to_string(),
        path_prefix: prefix.to_string(),
        target_prefix: target.map(str::to_string),
        rewrite: rewrite
            .iter()
            .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
            .collect::<BTreeMap<_, _>>(),
    });
}

/// 构建网关上下文与完整中间件栈的路由器
pub fn gateway(config: AppConfig, identity: Arc<StaticIdentity>) -> (Arc<AppContext>, Router) {
    let config = Arc::new(config);
    let context = Arc::new(
        AppContext::with_identity(Arc::clone(&config), identity).expect("context should build"),
    );
    let router = build_router(AppState::new(Arc::clone(&context)), &config.server);
    (context, router)
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
