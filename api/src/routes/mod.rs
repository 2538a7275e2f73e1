//! HTTP route entry point for `/api/...`.
//!
//! Route groups:
//! - `/health` → liveness check (public)
//! - `/auth` → login (public)
//! - `/classes/{class_id}/sessions` → session lifecycle, scanning, rosters
//!   (class-scoped guards applied per route)
//! - `/students` → per-student attendance summaries (authenticated)

use axum::{Router, middleware::from_fn};
use util::state::AppState;

use crate::auth::guards::allow_authenticated;

pub mod auth;
pub mod classes;
pub mod health;
pub mod students;

/// Builds the complete application router for all HTTP endpoints.
///
/// All state is supplied here; the returned router is ready to serve or to
/// nest under a prefix.
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .nest("/health", health::health_routes())
        .nest("/auth", auth::auth_routes())
        .nest("/classes", classes::classes_routes(app_state.clone()))
        .nest(
            "/students",
            students::students_routes().route_layer(from_fn(allow_authenticated)),
        )
        .with_state(app_state)
}
