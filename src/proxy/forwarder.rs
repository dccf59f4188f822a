//! # 请求转发
//!
//! 构建出站请求头、通过连接池发送，并把后端响应原样转交给调用方。

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Response};
use bytes::Bytes;

use crate::error::{ProxyError, Result};
use crate::management::middleware::TRACE_ID_HEADER;

/// 服务间认证头
pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";
pub const SERVICE_ID_HEADER: &str = "x-service-id";
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// 不从入站请求复制的头
const STRIPPED_REQUEST_HEADERS: [&str; 7] = [
    // 身份头只由网关设置，入站的 X-Service-Name 也一并丢弃
    SERVICE_TOKEN_HEADER,
    SERVICE_ID_HEADER,
    SERVICE_NAME_HEADER,
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
];

/// 不转交给调用方的后端响应头
const STRIPPED_RESPONSE_HEADERS: [&str; 4] =
    ["transfer-encoding", "content-length", "connection", "server"];

/// 网关自身的服务身份
#[derive(Debug, Clone, Copy)]
pub struct ServiceIdentity<'a> {
    pub token: &'a str,
    pub service_id: &'a str,
    pub service_name: &'a str,
}

/// 出站请求
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 构建出站请求头
///
/// 复制入站头（去掉内部认证头和由客户端重新计算的头），
/// 然后写入用户令牌、服务身份和追踪ID。
#[must_use]
pub fn build_outbound_headers(
    inbound: &HeaderMap,
    user_token: Option<&str>,
    identity: Option<ServiceIdentity<'_>>,
    trace_id: &str,
) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in STRIPPED_REQUEST_HEADERS {
        headers.remove(name);
    }

    if let Some(value) = user_token.and_then(bearer_value) {
        headers.insert(AUTHORIZATION, value);
    }

    if let Some(identity) = identity {
        insert_header(&mut headers, SERVICE_TOKEN_HEADER, identity.token);
        insert_header(&mut headers, SERVICE_ID_HEADER, identity.service_id);
        insert_header(&mut headers, SERVICE_NAME_HEADER, identity.service_name);
    }

    insert_header(&mut headers, TRACE_ID_HEADER, trace_id);
    headers
}

fn bearer_value(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {token}")).ok()
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// 发送出站请求
///
/// 传输层失败（连接失败、超时）统一视为上游不可用，不做重试。
pub async fn send(client: &reqwest::Client, request: OutboundRequest) -> Result<reqwest::Response> {
    client
        .request(request.method, &request.url)
        .headers(request.headers)
        .body(request.body)
        .send()
        .await
        .map_err(|e| {
            let reason = if e.is_timeout() {
                "请求超时"
            } else if e.is_connect() {
                "连接失败"
            } else {
                "传输失败"
            };
            ProxyError::upstream_not_available_with_source(
                format!("{reason}: {}", request_target(&e)),
                e,
            )
        })
}

fn request_target(error: &reqwest::Error) -> String {
    error
        .url()
        .map_or_else(|| "<unknown>".to_string(), |url| url.as_str().to_string())
}

/// 把后端响应转成入站响应：状态码原样保留，过滤逐跳头
pub async fn relay_response(upstream: reqwest::Response) -> Result<Response<Body>> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    for name in STRIPPED_RESPONSE_HEADERS {
        headers.remove(name);
    }

    let body = upstream
        .bytes()
        .await
        .map_err(|e| ProxyError::internal_with_source("读取后端响应体失败", e))?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
