//! # Trace ID 中间件
//!
//! 为每个请求确定追踪ID（沿用入站 `X-Trace-ID`，否则生成 UUID），
//! 注入请求扩展并回写到响应头，同时输出每个请求的汇总日志。

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;

use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::header::CONTENT_LENGTH;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;
use uuid::Uuid;

use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 追踪ID请求头
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// 入站追踪ID的最大长度
const MAX_TRACE_ID_LEN: usize = 128;

/// 追踪ID类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header(value: Option<&HeaderValue>) -> Option<Self> {
        value
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_TRACE_ID_LEN)
            .map(|v| Self(v.to_string()))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for TraceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for TraceId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// 处理器中直接提取追踪ID；中间件未运行时生成新的
impl<S: Send + Sync> FromRequestParts<S> for TraceId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}

/// 追踪ID与请求日志中间件
pub async fn trace_id_middleware(mut request: Request, next: Next) -> Response {
    let trace_id =
        TraceId::from_header(request.headers().get(TRACE_ID_HEADER)).unwrap_or_default();
    request.extensions_mut().insert(trace_id.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_default();
    let request_size = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let start = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let summary = format!("{method} {path} -> {status}");
    if status < 400 {
        linfo!(
            trace_id.as_str(),
            LogStage::Response,
            LogComponent::Proxy,
            "request_completed",
            &summary,
            method = method.as_str(),
            path = path,
            query = query,
            client = client,
            status = status,
            duration_ms = duration_ms,
            request_size = request_size
        );
    } else {
        lwarn!(
            trace_id.as_str(),
            LogStage::ResponseFailure,
            LogComponent::Proxy,
            "request_completed",
            &summary,
            method = method.as_str(),
            path = path,
            query = query,
            client = client,
            status = status,
            duration_ms = duration_ms,
            request_size = request_size
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_trace_id_is_reused() {
        let value = HeaderValue::from_static("abc-123");
        assert_eq!(
            TraceId::from_header(Some(&value)),
            Some(TraceId::from("abc-123"))
        );
    }

    #[test]
    fn test_invalid_inbound_trace_id_is_replaced() {
        let long = "x".repeat(MAX_TRACE_ID_LEN + 1);
        let value = HeaderValue::from_str(&long).unwrap();
        assert_eq!(TraceId::from_header(Some(&value)), None);
        assert_eq!(TraceId::from_header(Some(&HeaderValue::from_static("  "))), None);
        assert_eq!(TraceId::from_header(None), None);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(TraceId::new(), TraceId::new());
    }
}
