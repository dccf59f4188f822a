//! 指标查询处理器

use axum::extract::State;
use axum::response::IntoResponse;

use crate::logging::{LogComponent, LogStage};
use crate::linfo;
use crate::management::middleware::TraceId;
use crate::management::{response, server::AppState};

/// `GET /api/v1/metrics`
pub async fn get_metrics(State(state): State<AppState>, trace_id: TraceId) -> impl IntoResponse {
    response::success(state.metrics.snapshot(), &trace_id)
}

/// `POST /api/v1/metrics/reset`
pub async fn reset_metrics(State(state): State<AppState>, trace_id: TraceId) -> impl IntoResponse {
    state.metrics.reset();
    linfo!(
        trace_id.as_str(),
        LogStage::Response,
        LogComponent::Statistics,
        "metrics_reset",
        "指标已清零"
    );
    response::success_with_message((), "指标已清零", &trace_id)
}
