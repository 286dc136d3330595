//! HTTP control plane.
//!
//! Thin axum layer over the engine and the state store: rule CRUD, bulk
//! install, reload, dry-run testing, the recent-alert audit view and system
//! telemetry. Every response uses the `{success, message, data, error}`
//! envelope.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;

use lw_consumer::ConsumerTelemetry;
use lw_engine::{AlertEngine, EngineError};
use lw_store::{StateStore, StoreError};

mod rules_api;
mod system_api;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AlertEngine>,
    pub store: Arc<dyn StateStore>,
    pub telemetry: Arc<ConsumerTelemetry>,
    /// Level assigned to test samples that carry none.
    pub default_log_level: String,
}

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Control-plane error, mapped onto HTTP status codes.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(store) => store.into(),
            EngineError::Validation(v) => ApiError::Validation(v.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

/// Build the `/api/v1` router.
pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .route("/health", get(system_api::get_health))
                .route(
                    "/rules",
                    get(rules_api::list_rules).post(rules_api::create_rule),
                )
                .route(
                    "/rules/:id",
                    get(rules_api::get_rule)
                        .put(rules_api::update_rule)
                        .delete(rules_api::delete_rule),
                )
                .route("/rules/bulk", post(rules_api::bulk_create_rules))
                .route("/rules/reload", post(rules_api::reload_rules))
                .route("/rules/test", post(rules_api::test_rule))
                .route("/alerts/recent", get(rules_api::recent_alerts))
                .route("/system/metrics", get(system_api::get_metrics))
                .route("/system/logs/stats", get(system_api::get_log_stats)),
        )
        .with_state(state)
}
