use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use util::state::AppState;

use db::models::attendance_record::AttendanceStatus;
use db::models::enrollment::{Model as Enrollment, Role};
use services::ledger::{AttendanceLedger, RecordDraft};
use services::session::SessionService;

use super::common::{CorrectionReq, RecordDto, attendance_error_response};
use crate::{auth::AuthUser, response::ApiResponse};

/// PUT /api/classes/{class_id}/sessions/{session_id}/records/{student_id}
///
/// Lecturer/admin correction of one student's outcome. This is the only path
/// that may change a record after the session completed, and it bypasses the
/// ledger's upsert ordering: a correction is an explicit override.
pub async fn correct_record(
    State(state): State<AppState>,
    Path((class_id, session_id, student_id)): Path<(i64, i64, i64)>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
    Json(body): Json<CorrectionReq>,
) -> Response {
    let db = state.db();

    if let Err(err) = SessionService::find(db, class_id, session_id).await {
        return attendance_error_response(&err);
    }

    match Enrollment::is_in_role(db, student_id, class_id, Role::Student).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<RecordDto>::error(
                    "Student is not enrolled in this class",
                )),
            )
                .into_response();
        }
        Err(err) => {
            tracing::error!("enrollment lookup failed: {err}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<RecordDto>::error("Storage unavailable")),
            )
                .into_response();
        }
    }

    // Manual marks carry no scan evidence; only accepted scans keep a
    // check-in time.
    let checkin_time = match body.status {
        AttendanceStatus::OnTime | AttendanceStatus::Late => Some(Utc::now()),
        _ => None,
    };

    let draft = RecordDraft {
        session_id,
        student_id,
        status: body.status,
        checkin_time,
        latitude: None,
        longitude: None,
        device_fingerprint: None,
    };

    match AttendanceLedger::put(db, draft).await {
        Ok(record) => {
            tracing::info!(
                lecturer = claims.sub,
                session_id,
                student_id,
                status = %record.status,
                "attendance record corrected"
            );
            (
                StatusCode::OK,
                Json(ApiResponse::success(
                    RecordDto::from_record(record, None),
                    "Record updated",
                )),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!("record correction failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<RecordDto>::error("Storage unavailable")),
            )
                .into_response()
        }
    }
}
