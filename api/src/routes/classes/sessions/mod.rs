use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use util::state::AppState;

mod common;
mod get;
mod post;
mod put;

pub use get::{export_session_records_csv, get_session, get_session_token, list_session_records, list_sessions};
pub use post::{end_session, rotate_session_token, scan_session, schedule_session, start_session};
pub use put::correct_record;

use crate::auth::guards::{require_class_lecturer, require_class_member};

pub fn session_routes(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).route_layer(from_fn_with_state(app_state.clone(), require_class_member)))
        .route("/", post(schedule_session).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}", get(get_session).route_layer(from_fn_with_state(app_state.clone(), require_class_member)))
        .route("/{session_id}/start", post(start_session).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}/rotate", post(rotate_session_token).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}/token", get(get_session_token).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}/scan", post(scan_session).route_layer(from_fn_with_state(app_state.clone(), require_class_member)))
        .route("/{session_id}/end", post(end_session).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}/records", get(list_session_records).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}/records/export", get(export_session_records_csv).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .route("/{session_id}/records/{student_id}", put(correct_record).route_layer(from_fn_with_state(app_state.clone(), require_class_lecturer)))
        .with_state(app_state)
}
