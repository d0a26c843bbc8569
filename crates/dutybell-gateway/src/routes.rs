//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use dutybell_core::error::DutyBellError;
use dutybell_core::traits::{ObligationStore, ProbeStatus};
use serde::Deserialize;
use std::sync::Arc;

use crate::server::AppState;

type JsonResponse = (StatusCode, Json<serde_json::Value>);

/// Scheduled reminder run. Accepts GET and POST.
pub async fn cron_reminders(State(state): State<Arc<AppState>>) -> JsonResponse {
    match state.engine.run().await {
        Ok(results) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Reminders processed",
                "results": results,
            })),
        ),
        Err(e) => {
            tracing::error!("Cron job failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

/// Manually send one obligation's reminder.
pub async fn remind_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> JsonResponse {
    match state.engine.remind_one(&id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::to_value(&outcome).unwrap_or_else(|e| {
                serde_json::json!({"success": outcome.success, "error": e.to_string()})
            })),
        ),
        Err(DutyBellError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": format!("Task not found: {id}")})),
        ),
        Err(e) => {
            tracing::error!("Manual reminder for {id} failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

fn default_log_limit() -> usize {
    50
}

/// Most recent reminder ledger rows, newest first.
pub async fn reminder_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> JsonResponse {
    let limit = query.limit.clamp(1, 500);
    match state.db.recent_logs(limit) {
        Ok(logs) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "count": logs.len(), "logs": logs})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"ok": false, "error": e.to_string()})),
        ),
    }
}

/// Storage and channel health. 503 unless both are reachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> JsonResponse {
    let database = match state.db.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::error!("Health check: database unreachable: {e}");
            "failed"
        }
    };
    let telegram = state.notifier.probe().await;

    let healthy = database == "connected" && telegram == ProbeStatus::Connected;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime_secs": state.start_time.elapsed().as_secs(),
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "database": database,
                "telegram": telegram.as_str(),
            }
        })),
    )
}
