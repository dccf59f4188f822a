//! 代理入口：所有未被管理接口匹配的请求

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;

use crate::management::middleware::TraceId;
use crate::management::{response, server::AppState};

pub async fn proxy_handler(
    State(state): State<AppState>,
    trace_id: TraceId,
    request: Request<Body>,
) -> Response {
    match state.proxy.dispatch(request, trace_id.as_str()).await {
        Ok(response) => response,
        Err(error) => response::app_error(error, &trace_id),
    }
}
