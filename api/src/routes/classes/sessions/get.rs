//! Session read routes: list sessions, session detail, current token,
//! roster records, CSV export.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use util::state::AppState;

use db::models::attendance_record::{Column as RecordCol, Entity as RecordEntity};
use db::models::class_session::{Column as SessionCol, Entity as SessionEntity};
use db::models::enrollment::Model as Enrollment;
use db::models::user::{Column as UserCol, Entity as UserEntity};
use services::session::SessionService;

use super::common::{
    ListQuery, ListResponse, RecordDto, RecordsListQuery, RecordsListResponse, SessionResponse,
    SessionTokenResponse, attendance_error_response,
};
use crate::response::ApiResponse;

/// GET /api/classes/{class_id}/sessions
///
/// Paginated session list with `status` filter and `-`-prefixed sort keys.
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(class_id): Path<i64>,
    Query(q): Query<ListQuery>,
) -> (StatusCode, Json<ApiResponse<ListResponse>>) {
    let db = state.db();
    let page = q.page.unwrap_or(1).max(1) as u64;
    let per_page = q.per_page.unwrap_or(20).clamp(1, 100) as u64;

    let mut sel = SessionEntity::find().filter(SessionCol::ClassId.eq(class_id));
    if let Some(status) = q.status {
        sel = sel.filter(SessionCol::Status.eq(status));
    }
    sel = match q.sort.as_deref() {
        Some(sort) if sort.starts_with('-') => match &sort[1..] {
            "scheduled_start" => sel.order_by_desc(SessionCol::ScheduledStart),
            "status" => sel.order_by_desc(SessionCol::Status),
            _ => sel.order_by_desc(SessionCol::ScheduledStart),
        },
        Some("status") => sel.order_by_asc(SessionCol::Status),
        _ => sel.order_by_asc(SessionCol::ScheduledStart),
    };

    let paginator = sel.paginate(db, per_page);
    let total = paginator.num_items().await.unwrap_or(0) as i32;
    let rows = paginator
        .fetch_page(page.saturating_sub(1))
        .await
        .unwrap_or_default();

    let enrolled_count = Enrollment::student_ids_for_class(db, class_id)
        .await
        .map(|ids| ids.len() as i64)
        .unwrap_or(0);

    let session_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let attended_map = attended_counts(db, &session_ids).await.unwrap_or_default();

    let resp = ListResponse {
        sessions: rows
            .into_iter()
            .map(|s| {
                let attended = *attended_map.get(&s.id).unwrap_or(&0);
                SessionResponse::from_with_counts(s, attended, enrolled_count)
            })
            .collect(),
        page: page as i32,
        per_page: per_page as i32,
        total,
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(resp, "Sessions retrieved")),
    )
}

/// GET /api/classes/{class_id}/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
) -> Response {
    let db = state.db();

    match SessionService::find(db, class_id, session_id).await {
        Ok(session) => {
            let enrolled_count = Enrollment::student_ids_for_class(db, class_id)
                .await
                .map(|ids| ids.len() as i64)
                .unwrap_or(0);
            let attended = attended_counts(db, &[session.id])
                .await
                .ok()
                .and_then(|m| m.get(&session.id).copied())
                .unwrap_or(0);

            (
                StatusCode::OK,
                Json(ApiResponse::success(
                    SessionResponse::from_with_counts(session, attended, enrolled_count),
                    "Session retrieved",
                )),
            )
                .into_response()
        }
        Err(err) => attendance_error_response(&err),
    }
}

/// GET /api/classes/{class_id}/sessions/{session_id}/token
///
/// The current live token for QR display. Returns the expiry error once the
/// window has lapsed; the lecturer rotates to continue.
pub async fn get_session_token(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
) -> Response {
    let db = state.db();
    let now = Utc::now();

    let session = match SessionService::find(db, class_id, session_id).await {
        Ok(session) => session,
        Err(err) => return attendance_error_response(&err),
    };

    match SessionService::current_token(&session, now) {
        Ok(token) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                SessionTokenResponse {
                    session_id: session.id,
                    token: token.to_owned(),
                    token_expires_at: session
                        .token_expires_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                },
                "Current token",
            )),
        )
            .into_response(),
        Err(err) => attendance_error_response(&err),
    }
}

/// GET /api/classes/{class_id}/sessions/{session_id}/records
///
/// Roster view of one session's ledger records with pagination and sorting.
pub async fn list_session_records(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
    Query(q): Query<RecordsListQuery>,
) -> Response {
    let db = state.db();

    if let Err(err) = SessionService::find(db, class_id, session_id).await {
        return attendance_error_response(&err);
    }

    let page = q.page.unwrap_or(1).max(1) as u64;
    let per_page = q.per_page.unwrap_or(20).clamp(1, 200) as u64;

    let mut sel = RecordEntity::find().filter(RecordCol::SessionId.eq(session_id));
    sel = match q.sort.as_deref() {
        Some(sort) if sort.starts_with('-') => match &sort[1..] {
            "checkin_time" => sel.order_by_desc(RecordCol::CheckinTime),
            "student_id" => sel.order_by_desc(RecordCol::StudentId),
            _ => sel.order_by_desc(RecordCol::CheckinTime),
        },
        Some("checkin_time") => sel.order_by_asc(RecordCol::CheckinTime),
        _ => sel.order_by_asc(RecordCol::StudentId),
    };

    let paginator = sel.paginate(db, per_page);
    let total = paginator.num_items().await.unwrap_or(0) as i32;
    let rows = paginator
        .fetch_page(page.saturating_sub(1))
        .await
        .unwrap_or_default();

    let usernames = usernames_for(db, rows.iter().map(|r| r.student_id).collect())
        .await
        .unwrap_or_default();

    let records = rows
        .into_iter()
        .map(|r| {
            let username = usernames.get(&r.student_id).cloned();
            RecordDto::from_record(r, username)
        })
        .collect::<Vec<_>>();

    (
        StatusCode::OK,
        Json(ApiResponse::success(
            RecordsListResponse {
                records,
                page: page as i32,
                per_page: per_page as i32,
                total,
            },
            "Records retrieved",
        )),
    )
        .into_response()
}

/// GET /api/classes/{class_id}/sessions/{session_id}/records/export
///
/// CSV download of one session's records:
/// `session_id,student_id,username,status,checkin_time,latitude,longitude,device_fingerprint`
pub async fn export_session_records_csv(
    State(state): State<AppState>,
    Path((class_id, session_id)): Path<(i64, i64)>,
) -> Response {
    let db = state.db();

    if let Err(err) = SessionService::find(db, class_id, session_id).await {
        return attendance_error_response(&err);
    }

    let records = match RecordEntity::find()
        .filter(RecordCol::SessionId.eq(session_id))
        .order_by_asc(RecordCol::StudentId)
        .all(db)
        .await
    {
        Ok(v) => v,
        Err(err) => {
            tracing::error!("record export failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<super::common::RejectionBody>::error(
                    "Failed to export records",
                )),
            )
                .into_response();
        }
    };

    let usernames = usernames_for(db, records.iter().map(|r| r.student_id).collect())
        .await
        .unwrap_or_default();

    let mut csv = String::from(
        "session_id,student_id,username,status,checkin_time,latitude,longitude,device_fingerprint\n",
    );

    fn esc(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }

    for r in records {
        let username = usernames
            .get(&r.student_id)
            .map(|s| s.as_str())
            .unwrap_or("");
        let checkin = r
            .checkin_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let row = format!(
            "{},{},{},{},{},{},{},{}\n",
            r.session_id,
            r.student_id,
            esc(username),
            r.status,
            esc(&checkin),
            r.latitude.map(|v| v.to_string()).unwrap_or_default(),
            r.longitude.map(|v| v.to_string()).unwrap_or_default(),
            esc(&r.device_fingerprint.unwrap_or_default()),
        );
        csv.push_str(&row);
    }

    let filename = format!("attendance_session_{}.csv", session_id);
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        axum::http::header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .unwrap_or(HeaderValue::from_static("attachment")),
    );

    (StatusCode::OK, (headers, csv)).into_response()
}

/// Per-session count of accepted (`on_time`/`late`) records.
async fn attended_counts(
    db: &DatabaseConnection,
    session_ids: &[i64],
) -> Result<HashMap<i64, i64>, DbErr> {
    use db::models::attendance_record::AttendanceStatus;

    if session_ids.is_empty() {
        return Ok(HashMap::new());
    }

    #[derive(FromQueryResult)]
    struct Row {
        session_id: i64,
        cnt: i64,
    }

    let rows: Vec<Row> = RecordEntity::find()
        .select_only()
        .column(RecordCol::SessionId)
        .column_as(
            Expr::expr(Func::count(Expr::col(RecordCol::StudentId))),
            "cnt",
        )
        .filter(RecordCol::SessionId.is_in(session_ids.iter().copied()))
        .filter(RecordCol::Status.is_in([AttendanceStatus::OnTime, AttendanceStatus::Late]))
        .group_by(RecordCol::SessionId)
        .into_model::<Row>()
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|r| (r.session_id, r.cnt)).collect())
}

async fn usernames_for(
    db: &DatabaseConnection,
    user_ids: Vec<i64>,
) -> Result<HashMap<i64, String>, DbErr> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = UserEntity::find()
        .filter(UserCol::Id.is_in(user_ids))
        .all(db)
        .await?;
    Ok(users.into_iter().map(|u| (u.id, u.username)).collect())
}
