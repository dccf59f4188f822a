//! # 代理分发服务
//!
//! 单个请求的完整出站流程：选路 → 熔断准入 → 取服务凭证 → 连接池许可 →
//! 转发 → 记录熔断结果 → 转交响应。业务请求失败不会被网关自动重试。

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};

use super::circuit_breaker::CircuitBreakerRegistry;
use super::forwarder::{self, OutboundRequest, ServiceIdentity};
use super::pool::ConnectionPool;
use super::router::RouteTable;
use crate::auth::{CredentialManager, extract_user_token};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, sanitize_token};
use crate::{ldebug, lwarn};

/// 请求分发器
#[derive(Debug, Clone)]
pub struct ProxyService {
    routes: Arc<RouteTable>,
    breakers: Arc<CircuitBreakerRegistry>,
    pool: Arc<ConnectionPool>,
    credentials: Arc<CredentialManager>,
    max_body_bytes: usize,
}

impl ProxyService {
    #[must_use]
    pub const fn new(
        routes: Arc<RouteTable>,
        breakers: Arc<CircuitBreakerRegistry>,
        pool: Arc<ConnectionPool>,
        credentials: Arc<CredentialManager>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            routes,
            breakers,
            pool,
            credentials,
            max_body_bytes,
        }
    }

    /// 分发一个入站请求
    ///
    /// 后端返回的任何状态码都原样转交；只有网关自身无法完成转发时才返回错误。
    pub async fn dispatch(&self, request: Request<Body>, trace_id: &str) -> Result<Response<Body>> {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path();

        let matched = self.routes.match_route(path).ok_or_else(|| {
            ProxyError::upstream_not_found(format!("没有匹配的路由: {path}"))
        })?;
        let route = matched.route;
        let target_url = matched.target_url(parts.uri.query());

        ldebug!(
            trace_id,
            LogStage::Routing,
            LogComponent::Router,
            "route_matched",
            &format!("{path} -> {target_url}"),
            service = route.service_name,
            prefix = route.path_prefix
        );

        let breaker = self.breakers.get(&route.circuit_breaker_key).ok_or_else(|| {
            ProxyError::internal(format!("缺少熔断器: {}", route.circuit_breaker_key))
        })?;

        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| ProxyError::invalid_request_with_source("读取请求体失败", e))?;

        if let Err(err) = breaker.try_acquire() {
            lwarn!(
                trace_id,
                LogStage::Admission,
                LogComponent::CircuitBreaker,
                "circuit_open_reject",
                &format!("熔断器打开，拒绝请求: {path}"),
                service = route.service_name
            );
            return Err(err);
        }

        let user_token = extract_user_token(&parts.headers);
        let service_token = self.credentials.get_token().await;
        if service_token.is_none() && self.credentials.is_enabled() {
            lwarn!(
                trace_id,
                LogStage::Authentication,
                LogComponent::Credential,
                "no_service_token",
                "没有可用的服务令牌，省略服务认证头"
            );
        }
        let identity = service_token.as_deref().map(|token| ServiceIdentity {
            token,
            service_id: self.credentials.service_id(),
            service_name: self.credentials.service_name(),
        });

        let headers =
            forwarder::build_outbound_headers(&parts.headers, user_token.as_deref(), identity, trace_id);

        ldebug!(
            trace_id,
            LogStage::UpstreamRequest,
            LogComponent::Proxy,
            "forward",
            &format!("{} {target_url}", parts.method),
            user_token = user_token.as_deref().map(sanitize_token),
            body_bytes = body.len()
        );

        let lease = match self.pool.acquire(&route.service_name).await {
            Ok(lease) => lease,
            Err(err) => {
                breaker.record_failure();
                return Err(err);
            }
        };

        let outbound = OutboundRequest {
            method: parts.method,
            url: target_url,
            headers,
            body,
        };

        let upstream = match forwarder::send(&lease.client, outbound).await {
            Ok(upstream) => upstream,
            Err(err) => {
                breaker.record_failure();
                lwarn!(
                    trace_id,
                    LogStage::ResponseFailure,
                    LogComponent::Proxy,
                    "upstream_unavailable",
                    &format!("后端不可用: {err}"),
                    service = route.service_name
                );
                return Err(err);
            }
        };

        breaker.record(!upstream.status().is_server_error());
        forwarder::relay_response(upstream).await
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}
