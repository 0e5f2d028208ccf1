use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub db_ok: bool,
    /// Registered shop count; None when the probe itself failed.
    pub shops: Option<i64>,
}

/// GET /api/health — liveness plus a DB probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let shops: Option<i64> = sqlx::query_scalar("SELECT COUNT(*) FROM barbershops")
        .fetch_one(&state.db)
        .await
        .ok();
    let db_ok = shops.is_some();

    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        db_ok,
        shops,
    })
}
