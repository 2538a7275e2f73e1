use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use db::models::attendance_record::AttendanceStatus;
use db::models::class_session::SessionStatus;
use services::AttendanceError;

use crate::response::ApiResponse;

#[derive(Debug, Serialize, Default)]
pub struct SessionResponse {
    pub id: i64,
    pub class_id: i64,
    pub started_by: Option<i64>,
    pub scheduled_start: String,
    pub scheduled_end: String,
    pub status: SessionStatus,
    pub token_issued_at: Option<String>,
    pub token_expires_at: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub location_radius_m: Option<f64>,
    pub attended_count: i64,
    pub enrolled_count: i64,
}

impl From<db::models::class_session::Model> for SessionResponse {
    fn from(m: db::models::class_session::Model) -> Self {
        Self {
            id: m.id,
            class_id: m.class_id,
            started_by: m.started_by,
            scheduled_start: m.scheduled_start.to_rfc3339(),
            scheduled_end: m.scheduled_end.to_rfc3339(),
            status: m.status,
            token_issued_at: m.token_issued_at.map(|t| t.to_rfc3339()),
            token_expires_at: m.token_expires_at.map(|t| t.to_rfc3339()),
            location_lat: m.location_lat,
            location_lng: m.location_lng,
            location_radius_m: m.location_radius_m,
            attended_count: 0,
            enrolled_count: 0,
        }
    }
}

impl SessionResponse {
    pub fn from_with_counts(
        m: db::models::class_session::Model,
        attended_count: i64,
        enrolled_count: i64,
    ) -> Self {
        let mut base = Self::from(m);
        base.attended_count = attended_count;
        base.enrolled_count = enrolled_count;
        base
    }
}

/// Start and rotate hand the raw token back to the lecturer exactly once per
/// issue; it is never included in plain session payloads.
#[derive(Serialize, Default)]
pub struct SessionTokenResponse {
    pub session_id: i64,
    pub token: String,
    pub token_expires_at: String,
}

#[derive(Deserialize, Validate)]
pub struct CreateSessionReq {
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    #[validate(range(min = 1.0, max = 10_000.0, message = "radius must be 1-10000 meters"))]
    pub location_radius_m: Option<f64>,
}

#[derive(Deserialize)]
pub struct EndSessionReq {
    pub outcome: SessionStatus,
}

#[derive(Deserialize)]
pub struct ScanReq {
    pub token: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub device_fingerprint: Option<String>,
}

#[derive(Deserialize)]
pub struct CorrectionReq {
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i32>,
    pub per_page: Option<i32>,
    pub status: Option<SessionStatus>,
    pub sort: Option<String>, // "scheduled_start", "-scheduled_start", "status", "-status"
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub sessions: Vec<SessionResponse>,
    pub page: i32,
    pub per_page: i32,
    pub total: i32,
}

/// A single attendance record (DTO) for API responses.
#[derive(Serialize, Default)]
pub struct RecordDto {
    pub session_id: i64,
    pub student_id: i64,
    pub username: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub checkin_time: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub device_fingerprint: Option<String>,
}

impl RecordDto {
    pub fn from_record(r: db::models::attendance_record::Model, username: Option<String>) -> Self {
        Self {
            session_id: r.session_id,
            student_id: r.student_id,
            username,
            status: Some(r.status),
            checkin_time: r.checkin_time.map(|t| t.to_rfc3339()),
            latitude: r.latitude,
            longitude: r.longitude,
            device_fingerprint: r.device_fingerprint,
        }
    }
}

#[derive(Deserialize)]
pub struct RecordsListQuery {
    pub page: Option<i32>,
    pub per_page: Option<i32>,
    /// `checkin_time` | `student_id` (prefix with `-` for desc).
    pub sort: Option<String>,
}

#[derive(Serialize)]
pub struct RecordsListResponse {
    pub records: Vec<RecordDto>,
    pub page: i32,
    pub per_page: i32,
    pub total: i32,
}

/// Machine-readable rejection payload alongside the human-readable message.
#[derive(Serialize, Default)]
pub struct RejectionBody {
    pub kind: String,
    pub distance_m: Option<f64>,
    pub radius_m: Option<f64>,
}

/// Maps an engine error to its HTTP response.
///
/// Every rejection kind gets a distinct, stable status so clients can render
/// targeted guidance; storage trouble is surfaced as 503.
pub fn attendance_error_response(err: &AttendanceError) -> Response {
    let status = match err {
        AttendanceError::NotEnrolled => StatusCode::FORBIDDEN,
        AttendanceError::SessionNotActive => StatusCode::CONFLICT,
        AttendanceError::InvalidToken => StatusCode::UNPROCESSABLE_ENTITY,
        AttendanceError::TokenExpired => StatusCode::GONE,
        AttendanceError::DuplicateScan => StatusCode::CONFLICT,
        AttendanceError::LocationMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AttendanceError::AlreadyActive => StatusCode::CONFLICT,
        AttendanceError::SessionNotFound => StatusCode::NOT_FOUND,
        AttendanceError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let mut body = RejectionBody {
        kind: err.kind().to_string(),
        ..Default::default()
    };
    if let AttendanceError::LocationMismatch {
        distance_m,
        radius_m,
    } = err
    {
        body.distance_m = *distance_m;
        body.radius_m = Some(*radius_m);
    }

    let message = err.to_string();
    (
        status,
        Json(ApiResponse {
            success: false,
            data: body,
            message,
        }),
    )
        .into_response()
}
