//! Student-facing attendance summary and risk reporting.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use util::{config, state::AppState};

use db::models::class::{Column as ClassCol, Entity as ClassEntity};
use db::models::class_session::{Column as SessionCol, Entity as SessionEntity, SessionStatus};
use db::models::enrollment::Model as Enrollment;
use services::aggregate::AttendanceAggregator;
use services::risk::{RiskThresholds, RiskTier, classes_needed_for_target, risk_tier};

use crate::{auth::AuthUser, response::ApiResponse};

pub fn students_routes() -> Router<AppState> {
    Router::new().route("/{user_id}/attendance-summary", get(attendance_summary))
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub class_id: Option<i64>,
    /// Target percentage for the catch-up projection; defaults to the
    /// configured high-risk threshold.
    pub target: Option<f64>,
}

#[derive(Serialize, Default)]
pub struct StudentSummaryResponse {
    pub student_id: i64,
    pub classes: Vec<ClassAttendance>,
}

#[derive(Serialize)]
pub struct ClassAttendance {
    pub class_id: i64,
    pub code: String,
    pub title: String,
    pub total_sessions: u64,
    pub attended: u64,
    pub on_time: u64,
    pub late: u64,
    pub absent: u64,
    pub rejected: u64,
    /// `null` until at least one session has been held.
    pub percentage: Option<f64>,
    /// Absent while `percentage` is undefined.
    pub risk: Option<RiskBlock>,
}

#[derive(Serialize)]
pub struct RiskBlock {
    pub tier: RiskTier,
    pub target_percent: f64,
    pub classes_needed: u64,
    pub can_reach_target: bool,
}

/// GET /api/students/{user_id}/attendance-summary?class_id=&target=
///
/// Summaries are visible to the student themselves and to admins.
pub async fn attendance_summary(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(q): Query<SummaryQuery>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
) -> (StatusCode, Json<ApiResponse<StudentSummaryResponse>>) {
    if claims.sub != user_id && !claims.admin {
        return (
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("You may only view your own attendance")),
        );
    }

    let db = state.db();
    let class_ids = match q.class_id {
        Some(id) => vec![id],
        None => match Enrollment::class_ids_for_student(db, user_id).await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!("enrollment lookup failed: {err}");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error("Storage unavailable")),
                );
            }
        },
    };

    let target = q.target.unwrap_or_else(config::risk_threshold_high);
    let thresholds = RiskThresholds {
        high: config::risk_threshold_high(),
        medium: config::risk_threshold_medium(),
    };

    let mut classes = Vec::with_capacity(class_ids.len());
    for class_id in class_ids {
        match class_attendance(db, user_id, class_id, target, &thresholds).await {
            Ok(Some(entry)) => classes.push(entry),
            Ok(None) => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error("Class not found")),
                );
            }
            Err(err) => {
                tracing::error!("summary failed for class {class_id}: {err}");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error("Storage unavailable")),
                );
            }
        }
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(
            StudentSummaryResponse {
                student_id: user_id,
                classes,
            },
            "Attendance summary retrieved",
        )),
    )
}

async fn class_attendance(
    db: &DatabaseConnection,
    student_id: i64,
    class_id: i64,
    target: f64,
    thresholds: &RiskThresholds,
) -> Result<Option<ClassAttendance>, DbErr> {
    let Some(class) = ClassEntity::find()
        .filter(ClassCol::Id.eq(class_id))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let summary = AttendanceAggregator::summarize(db, student_id, class_id).await?;

    let risk = match summary.percentage {
        Some(percentage) => {
            let remaining = SessionEntity::find()
                .filter(SessionCol::ClassId.eq(class_id))
                .filter(SessionCol::Status.is_in([
                    SessionStatus::Scheduled,
                    SessionStatus::InProgress,
                ]))
                .count(db)
                .await?;
            let plan = classes_needed_for_target(
                summary.attended,
                summary.total_sessions,
                target,
                Some(remaining),
            );
            Some(RiskBlock {
                tier: risk_tier(percentage, thresholds),
                target_percent: target,
                classes_needed: plan.classes_needed,
                can_reach_target: plan.can_reach_target,
            })
        }
        None => None,
    };

    Ok(Some(ClassAttendance {
        class_id,
        code: class.code,
        title: class.title,
        total_sessions: summary.total_sessions,
        attended: summary.attended,
        on_time: summary.on_time,
        late: summary.late,
        absent: summary.absent,
        rejected: summary.rejected,
        percentage: summary.percentage,
        risk,
    }))
}
