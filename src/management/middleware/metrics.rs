//! # 指标中间件
//!
//! 记录每个请求的路径、状态码和耗时。

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;

use crate::management::server::AppState;

pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    state
        .metrics
        .record(&path, response.status().as_u16(), start.elapsed());
    response
}
