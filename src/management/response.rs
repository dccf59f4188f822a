//! # API 响应结构
//!
//! 网关自身产生的所有 JSON 响应都使用统一信封：
//! `{code, message, data, timestamp, trace_id?}`。成功时 `code` 为 0，
//! 失败时为 HTTP 状态码，`timestamp` 为 Unix 秒。

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::middleware::{TRACE_ID_HEADER, TraceId};
use crate::error::ProxyError;
use crate::logging::{LogComponent, LogStage};
use crate::lerror;

/// # 统一响应信封
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// # 错误详情
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error: String,
}

/// # API响应枚举
///
/// 统一所有网关自身的出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithMessage(T, String),
    AppError(ProxyError),
}

impl<T: Serialize> ApiResponse<T> {
    /// 附带追踪ID生成响应
    pub fn into_traced(self, trace_id: &TraceId) -> Response {
        let (status, envelope) = match self {
            Self::Success(data) => (StatusCode::OK, envelope(0, "success".to_string(), Some(data))),
            Self::SuccessWithMessage(data, message) => {
                (StatusCode::OK, envelope(0, message, Some(data)))
            }
            Self::AppError(error) => {
                let (status, code) = error.to_http_response_parts();
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    lerror!(
                        trace_id.as_str(),
                        LogStage::Error,
                        LogComponent::Management,
                        "internal_error",
                        &format!("内部错误: {error}"),
                        code = code
                    );
                    "内部错误，请使用 trace_id 联系管理员".to_string()
                } else {
                    error.to_string()
                };
                let data = serde_json::to_value(ErrorInfo {
                    error: code.to_string(),
                })
                .ok();
                return respond(status, envelope(status.as_u16(), message, data), trace_id);
            }
        };
        respond(status, envelope, trace_id)
    }
}

fn envelope<T>(code: u16, message: String, data: Option<T>) -> ApiEnvelope<T> {
    ApiEnvelope {
        code,
        message,
        data,
        timestamp: Utc::now().timestamp(),
        trace_id: None,
    }
}

fn respond<T: Serialize>(
    status: StatusCode,
    mut envelope: ApiEnvelope<T>,
    trace_id: &TraceId,
) -> Response {
    envelope.trace_id = Some(trace_id.to_string());
    let mut response = (status, Json(envelope)).into_response();
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T, trace_id: &TraceId) -> Response {
    ApiResponse::Success(data).into_traced(trace_id)
}

/// # 便捷函数：带消息的成功响应
pub fn success_with_message<T: Serialize>(data: T, message: &str, trace_id: &TraceId) -> Response {
    ApiResponse::SuccessWithMessage(data, message.to_string()).into_traced(trace_id)
}

/// # 便捷函数：应用错误响应
pub fn app_error(error: ProxyError, trace_id: &TraceId) -> Response {
    ApiResponse::<()>::AppError(error).into_traced(trace_id)
}
