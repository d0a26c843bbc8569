//! HTTP server implementation using Axum.

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use dutybell_core::config::GatewayConfig;
use dutybell_core::traits::Notifier;
use dutybell_scheduler::{ReminderDb, ReminderEngine};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub start_time: std::time::Instant,
    /// Reminder run orchestrator shared by the cron and manual triggers.
    pub engine: Arc<ReminderEngine>,
    /// Obligation store and reminder ledger.
    pub db: Arc<ReminderDb>,
    /// Outbound channel, probed by the health check.
    pub notifier: Arc<dyn Notifier>,
}

/// Compare a presented token with the configured one by digest.
pub(crate) fn token_matches(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

fn bearer_token(req: &axum::http::Request<axum::body::Body>) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

fn unauthorized(body: serde_json::Value) -> axum::response::Response {
    use axum::response::IntoResponse;
    (axum::http::StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

/// Cron auth middleware — validates `Authorization: Bearer <cron_secret>`.
/// Open when no secret is configured.
async fn require_cron_secret(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let configured = state.gateway_config.cron_secret.as_deref();
    let Some(expected) = configured.filter(|s| !s.is_empty()) else {
        return next.run(req).await;
    };

    if bearer_token(&req).is_some_and(|t| token_matches(t, expected)) {
        return next.run(req).await;
    }

    tracing::warn!("Rejected cron trigger: missing or invalid bearer secret");
    use axum::response::IntoResponse;
    (axum::http::StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

/// Operator auth middleware — validates X-Operator-Token header or bearer token.
async fn require_operator(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let configured = state.gateway_config.operator_token.as_deref();
    let Some(expected) = configured.filter(|s| !s.is_empty()) else {
        return next.run(req).await;
    };

    let from_header = req
        .headers()
        .get("X-Operator-Token")
        .and_then(|v| v.to_str().ok());
    let presented = from_header.or_else(|| bearer_token(&req));

    if presented.is_some_and(|t| token_matches(t, expected)) {
        return next.run(req).await;
    }

    unauthorized(serde_json::json!({
        "success": false,
        "error": "Unauthorized — invalid or missing operator token"
    }))
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    // Cron trigger — shared secret
    let cron = Router::new()
        .route(
            "/api/cron/reminders",
            get(super::routes::cron_reminders).post(super::routes::cron_reminders),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_cron_secret,
        ));

    // Operator routes
    let protected = Router::new()
        .route(
            "/api/v1/tasks/{id}/remind",
            post(super::routes::remind_task),
        )
        .route(
            "/api/v1/reminder-logs",
            get(super::routes::reminder_logs),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_operator,
        ));

    // Public routes — no auth
    let public = Router::new()
        .route("/api/health", get(super::routes::health_check));

    cron.merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server, and the in-process schedule when one is configured.
pub async fn start(
    config: &dutybell_core::DutyBellConfig,
    engine: Arc<ReminderEngine>,
    db: Arc<ReminderDb>,
    notifier: Arc<dyn Notifier>,
) -> anyhow::Result<()> {
    if config.gateway.cron_secret.as_deref().is_none_or(str::is_empty) {
        tracing::warn!("⚠️ CRON_SECRET not set — cron trigger is open");
    }

    if let Some(expr) = config.reminders.schedule.as_deref() {
        let schedule = dutybell_scheduler::CronSchedule::parse(expr)?;
        tokio::spawn(dutybell_scheduler::run_schedule(
            engine.clone(),
            schedule,
            config.reminders.check_interval_secs,
        ));
    }

    let state = AppState {
        gateway_config: config.gateway.clone(),
        start_time: std::time::Instant::now(),
        engine,
        db,
        notifier,
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cre", "s3cret"));
        assert!(!token_matches("", "s3cret"));
    }
}
