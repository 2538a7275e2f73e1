use axum::Router;
use util::state::AppState;

pub mod sessions;

pub fn classes_routes(app_state: AppState) -> Router<AppState> {
    Router::new().nest(
        "/{class_id}/sessions",
        sessions::session_routes(app_state),
    )
}
