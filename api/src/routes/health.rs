use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use util::state::AppState;

use crate::response::ApiResponse;

#[derive(Serialize, Default)]
pub struct HealthStatus {
    pub db: bool,
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthStatus>>) {
    match state.db().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(HealthStatus { db: true }, "ok")),
        ),
        Err(err) => {
            tracing::error!("health check failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Database unreachable")),
            )
        }
    }
}
