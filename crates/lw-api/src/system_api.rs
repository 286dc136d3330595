//! Health and system telemetry endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use lw_common::rules::{rule_stats, RuleStats};
use lw_common::LogStats;
use lw_consumer::ConsumerMetrics;

use crate::{ApiError, ApiResponse, ApiState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rules_loaded: usize,
}

/// Engine readiness: the store must answer and rules must have loaded.
pub(crate) async fn get_health(State(state): State<ApiState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(ApiResponse::ok(HealthResponse {
            status: "ok",
            rules_loaded: state.engine.rules().len(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::failure(format!("store unreachable: {e}"))),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub consumer: ConsumerMetrics,
    pub rules: RuleStats,
}

pub(crate) async fn get_metrics(
    State(state): State<ApiState>,
) -> Result<Json<ApiResponse<SystemMetrics>>, ApiError> {
    let rules = state.engine.rules();
    Ok(Json(ApiResponse::ok(SystemMetrics {
        consumer: state.telemetry.snapshot(),
        rules: rule_stats(&rules),
    })))
}

pub(crate) async fn get_log_stats(
    State(state): State<ApiState>,
) -> Result<Json<ApiResponse<LogStats>>, ApiError> {
    let stats = state.store.get_log_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}
