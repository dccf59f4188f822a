//! # 准入控制中间件
//!
//! 在选路和熔断之前执行令牌桶限流，被拒绝的请求直接返回 429。

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::TraceId;
use crate::error::ProxyError;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::management::response;
use crate::management::server::AppState;

/// 限流中间件
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    trace_id: TraceId,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request, state.config.rate_limit.trust_forwarded_headers);

    if state.rate_limiter.allow(client) {
        return next.run(request).await;
    }

    lwarn!(
        trace_id.as_str(),
        LogStage::Admission,
        LogComponent::RateLimiter,
        "rate_limited",
        &format!("请求被限流: {}", request.uri().path()),
        client = client.map(|ip| ip.to_string())
    );
    response::app_error(ProxyError::rate_limit("请求过于频繁，请稍后重试"), &trace_id)
}

/// 获取客户端地址
///
/// 只有显式信任时才读取 `X-Forwarded-For` / `X-Real-IP`，否则使用连接对端地址。
#[must_use]
pub fn client_ip(request: &Request, trust_forwarded_headers: bool) -> Option<IpAddr> {
    if trust_forwarded_headers {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }

        let real_ip = request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if real_ip.is_some() {
            return real_ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::net::Ipv4Addr;

    fn request_with(forwarded: Option<&str>, peer: Option<SocketAddr>) -> Request {
        let mut builder = Request::builder().uri("/api/v1/job");
        if let Some(forwarded) = forwarded {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            request.extensions_mut().insert(ConnectInfo(peer));
        }
        request
    }

    #[test]
    fn test_peer_address_by_default() {
        let peer = SocketAddr::from((Ipv4Addr::new(10, 1, 1, 1), 5000));
        let request = request_with(Some("203.0.113.9"), Some(peer));
        assert_eq!(client_ip(&request, false), Some(peer.ip()));
    }

    #[test]
    fn test_forwarded_header_when_trusted() {
        let peer = SocketAddr::from((Ipv4Addr::new(10, 1, 1, 1), 5000));
        let request = request_with(Some("203.0.113.9, 10.0.0.1"), Some(peer));
        assert_eq!(
            client_ip(&request, true),
            Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))
        );
    }

    #[test]
    fn test_no_address_available() {
        assert_eq!(client_ip(&request_with(None, None), true), None);
    }
}
