use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use tokio::time::{Duration as StdDuration, sleep};
use util::{config, state::AppState};
use validator::Validate;

use db::models::class_session::{self, SessionStatus};
use services::AttendanceError;
use services::scan::{ScanInput, ScanOutcome, ScanPolicy, ScanService};
use services::session::SessionService;

use super::common::{
    CreateSessionReq, EndSessionReq, RejectionBody, ScanReq, SessionResponse, SessionTokenResponse,
    attendance_error_response,
};
use crate::{auth::AuthUser, response::ApiResponse};

/// POST /api/classes/{class_id}/sessions
///
/// Schedules a new session for the class. The session starts taking scans
/// only once the lecturer starts it.
pub async fn schedule_session(
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
    Json(body): Json<CreateSessionReq>,
) -> (StatusCode, Json<ApiResponse<SessionResponse>>) {
    if let Err(errors) = body.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(errors.to_string())),
        );
    }
    if body.scheduled_end <= body.scheduled_start {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("scheduled_end must be after scheduled_start")),
        );
    }
    // A geofence needs a full coordinate pair.
    if body.location_lat.is_some() != body.location_lng.is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(
                "location_lat and location_lng must be provided together",
            )),
        );
    }

    let now = Utc::now();
    let session = class_session::ActiveModel {
        class_id: Set(class_id),
        scheduled_start: Set(body.scheduled_start),
        scheduled_end: Set(body.scheduled_end),
        status: Set(SessionStatus::Scheduled),
        location_lat: Set(body.location_lat),
        location_lng: Set(body.location_lng),
        location_radius_m: Set(body.location_radius_m),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match session.insert(state.db()).await {
        Ok(row) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(
                SessionResponse::from(row),
                "Session scheduled",
            )),
        ),
        Err(err) => {
            tracing::error!("failed to schedule session: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to schedule session")),
            )
        }
    }
}

/// POST /api/classes/{class_id}/sessions/{session_id}/start
///
/// Starts a scheduled session and returns the first QR token.
pub async fn start_session(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
) -> Response {
    let now = Utc::now();
    match SessionService::start(
        state.db(),
        state.events(),
        class_id,
        session_id,
        claims.sub,
        now,
        config::token_validity_minutes(),
    )
    .await
    {
        Ok(session) => token_issued_response(session, "Session started"),
        Err(err) => attendance_error_response(&err),
    }
}

/// POST /api/classes/{class_id}/sessions/{session_id}/rotate
///
/// Issues a fresh token; the previous one is invalid from here on.
pub async fn rotate_session_token(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
) -> Response {
    let now = Utc::now();
    match SessionService::rotate_token(
        state.db(),
        state.events(),
        class_id,
        session_id,
        now,
        config::token_validity_minutes(),
    )
    .await
    {
        Ok(session) => token_issued_response(session, "Token rotated"),
        Err(err) => attendance_error_response(&err),
    }
}

fn token_issued_response(session: class_session::Model, message: &str) -> Response {
    let token = session.token.clone().unwrap_or_default();
    let expires = session
        .token_expires_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(ApiResponse::success(
            SessionTokenResponse {
                session_id: session.id,
                token,
                token_expires_at: expires,
            },
            message,
        )),
    )
        .into_response()
}

/// POST /api/classes/{class_id}/sessions/{session_id}/scan
///
/// Verifies a student scan. Rejections are persisted where auditable and
/// reported with their kind; a repeated scan echoes the stored record instead
/// of erroring.
pub async fn scan_session(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
    Json(body): Json<ScanReq>,
) -> Response {
    let policy = ScanPolicy {
        lateness_grace: Duration::minutes(config::lateness_grace_minutes()),
        default_radius_m: config::geofence_radius_meters(),
    };
    let input = ScanInput {
        student_id: claims.sub,
        submitted_token: body.token,
        latitude: body.latitude,
        longitude: body.longitude,
        device_fingerprint: body.device_fingerprint,
        now: Utc::now(),
    };

    // One bounded retry for infrastructure failure; verification itself is
    // re-run against fresh state, never skipped.
    let mut attempt = ScanService::scan(
        state.db(),
        state.events(),
        class_id,
        session_id,
        input.clone(),
        &policy,
    )
    .await;
    if matches!(attempt, Err(AttendanceError::Storage(_))) {
        sleep(StdDuration::from_millis(150)).await;
        attempt = ScanService::scan(
            state.db(),
            state.events(),
            class_id,
            session_id,
            input,
            &policy,
        )
        .await;
    }

    match attempt {
        Ok(ScanOutcome::Recorded(record)) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                super::common::RecordDto::from_record(record, None),
                "Attendance recorded",
            )),
        )
            .into_response(),
        Ok(ScanOutcome::Duplicate(record)) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                super::common::RecordDto::from_record(record, None),
                "Attendance already recorded",
            )),
        )
            .into_response(),
        Err(err) => attendance_error_response(&err),
    }
}

/// POST /api/classes/{class_id}/sessions/{session_id}/end
///
/// Moves the session to `completed` or `cancelled`.
pub async fn end_session(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
    Json(body): Json<EndSessionReq>,
) -> Response {
    if !body.outcome.is_terminal() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<RejectionBody>::error(
                "outcome must be 'completed' or 'cancelled'",
            )),
        )
            .into_response();
    }

    match SessionService::end(
        state.db(),
        state.events(),
        class_id,
        session_id,
        body.outcome,
        Utc::now(),
    )
    .await
    {
        Ok(session) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                SessionResponse::from(session),
                "Session ended",
            )),
        )
            .into_response(),
        Err(err) => attendance_error_response(&err),
    }
}
