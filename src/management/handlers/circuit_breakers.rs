//! 熔断器状态处理器

use axum::extract::State;
use axum::response::IntoResponse;

use crate::management::middleware::TraceId;
use crate::management::{response, server::AppState};

/// `GET /api/v1/circuit-breakers`
pub async fn list_circuit_breakers(
    State(state): State<AppState>,
    trace_id: TraceId,
) -> impl IntoResponse {
    response::success(state.breakers.all_stats(), &trace_id)
}
