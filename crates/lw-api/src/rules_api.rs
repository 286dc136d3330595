//! Rule management and alert audit endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use lw_common::rules::{filter_rules, RuleFilter};
use lw_common::{Alert, AlertRule, LogRecord};
use lw_engine::DryRunResult;
use lw_store::MAX_RECENT_ALERTS;

use crate::{ApiError, ApiResponse, ApiState};

pub(crate) async fn list_rules(
    State(state): State<ApiState>,
    Query(filter): Query<RuleFilter>,
) -> Result<Json<ApiResponse<Vec<AlertRule>>>, ApiError> {
    let rules = state.store.get_rules().await?;
    Ok(Json(ApiResponse::ok(filter_rules(&rules, &filter))))
}

pub(crate) async fn get_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AlertRule>>, ApiError> {
    let rule = state.store.get_rule(&id).await?;
    Ok(Json(ApiResponse::ok(rule)))
}

pub(crate) async fn create_rule(
    State(state): State<ApiState>,
    Json(rule): Json<AlertRule>,
) -> Result<Json<ApiResponse<AlertRule>>, ApiError> {
    let saved = state.engine.add_rule(rule).await?;
    info!(rule = %saved.id, "Rule created");
    Ok(Json(ApiResponse::ok_with_message(saved, "rule created")))
}

pub(crate) async fn update_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(rule): Json<AlertRule>,
) -> Result<Json<ApiResponse<AlertRule>>, ApiError> {
    let saved = state.engine.update_rule(&id, rule).await?;
    info!(rule = %saved.id, "Rule updated");
    Ok(Json(ApiResponse::ok_with_message(saved, "rule updated")))
}

pub(crate) async fn delete_rule(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    state.engine.delete_rule(&id).await?;
    info!(rule = %id, "Rule deleted");
    Ok(Json(ApiResponse::ok_with_message(id, "rule deleted")))
}

/// Outcome of a bulk install. Valid rules are installed; rejected ones are
/// reported alongside.
#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub installed: usize,
    pub rejected: Vec<BulkRejection>,
}

#[derive(Debug, Serialize)]
pub struct BulkRejection {
    pub name: String,
    pub error: String,
}

pub(crate) async fn bulk_create_rules(
    State(state): State<ApiState>,
    Json(rules): Json<Vec<AlertRule>>,
) -> Result<Json<ApiResponse<BulkResult>>, ApiError> {
    let mut result = BulkResult {
        installed: 0,
        rejected: Vec::new(),
    };
    for rule in rules {
        let name = rule.name.clone();
        match state.engine.add_rule(rule).await {
            Ok(_) => result.installed += 1,
            Err(e) => result.rejected.push(BulkRejection {
                name,
                error: e.to_string(),
            }),
        }
    }
    info!(
        installed = result.installed,
        rejected = result.rejected.len(),
        "Bulk rule install"
    );
    Ok(Json(ApiResponse::ok(result)))
}

#[derive(Debug, Serialize)]
pub struct ReloadResult {
    pub rules_loaded: usize,
}

pub(crate) async fn reload_rules(
    State(state): State<ApiState>,
) -> Result<Json<ApiResponse<ReloadResult>>, ApiError> {
    let rules_loaded = state.engine.reload_rules().await?;
    Ok(Json(ApiResponse::ok_with_message(
        ReloadResult { rules_loaded },
        "rules reloaded",
    )))
}

/// Dry-run request: a candidate rule plus raw sample records, evaluated
/// without persistence.
#[derive(Debug, Deserialize)]
pub struct TestRuleRequest {
    pub rule: AlertRule,
    #[serde(default)]
    pub sample_logs: Vec<serde_json::Value>,
}

pub(crate) async fn test_rule(
    State(state): State<ApiState>,
    Json(request): Json<TestRuleRequest>,
) -> Result<Json<ApiResponse<DryRunResult>>, ApiError> {
    lw_common::rules::validate(&request.rule)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    // Samples go through the same decode path as bus records; an
    // undecodable sample simply matches nothing.
    let samples: Vec<LogRecord> = request
        .sample_logs
        .iter()
        .filter_map(|value| {
            serde_json::to_vec(value)
                .ok()
                .and_then(|bytes| LogRecord::decode(&bytes, &state.default_log_level).ok())
        })
        .collect();

    let result = state.engine.dry_run(&request.rule, &samples);
    Ok(Json(ApiResponse::ok(result)))
}

#[derive(Debug, Deserialize)]
pub struct RecentAlertsQuery {
    pub limit: Option<usize>,
}

pub(crate) async fn recent_alerts(
    State(state): State<ApiState>,
    Query(query): Query<RecentAlertsQuery>,
) -> Result<Json<ApiResponse<Vec<Alert>>>, ApiError> {
    let limit = query.limit.unwrap_or(10).min(MAX_RECENT_ALERTS);
    let alerts = state.store.get_recent_alerts(limit).await?;
    Ok(Json(ApiResponse::ok(alerts)))
}
