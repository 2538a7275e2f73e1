//! Attendance aggregation.
//!
//! Summaries are recomputed from the ledger on demand rather than maintained
//! incrementally, so corrections are always reflected. The computation itself
//! is a pure fold over fetched rows; calling it twice on an unchanged ledger
//! yields identical output.

use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use db::models::attendance_record::AttendanceStatus;
use db::models::class_session::{self, SessionStatus};

use crate::ledger::AttendanceLedger;

/// Derived attendance picture of one student in one class.
///
/// Only sessions that were actually held (`completed`) count toward the
/// denominator; `percentage` is `None` when no session has been held yet,
/// never `0` or NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub student_id: i64,
    pub class_id: i64,
    pub total_sessions: u64,
    pub attended: u64,
    pub on_time: u64,
    pub late: u64,
    pub absent: u64,
    pub rejected: u64,
    pub percentage: Option<f64>,
}

pub struct AttendanceAggregator;

impl AttendanceAggregator {
    /// Computes the summary for (student, class) from the current ledger.
    pub async fn summarize(
        db: &DatabaseConnection,
        student_id: i64,
        class_id: i64,
    ) -> Result<AttendanceSummary, DbErr> {
        let held_sessions: Vec<i64> = class_session::Entity::find()
            .filter(class_session::Column::ClassId.eq(class_id))
            .filter(class_session::Column::Status.eq(SessionStatus::Completed))
            .order_by_asc(class_session::Column::ScheduledStart)
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let records = AttendanceLedger::records_for_student(db, student_id, &held_sessions).await?;
        let statuses: Vec<AttendanceStatus> = records.into_iter().map(|r| r.status).collect();

        Ok(fold_summary(
            student_id,
            class_id,
            held_sessions.len() as u64,
            &statuses,
        ))
    }
}

/// Pure fold from held-session count and record statuses to a summary.
pub fn fold_summary(
    student_id: i64,
    class_id: i64,
    total_sessions: u64,
    statuses: &[AttendanceStatus],
) -> AttendanceSummary {
    let on_time = statuses
        .iter()
        .filter(|s| **s == AttendanceStatus::OnTime)
        .count() as u64;
    let late = statuses
        .iter()
        .filter(|s| **s == AttendanceStatus::Late)
        .count() as u64;
    let absent = statuses
        .iter()
        .filter(|s| **s == AttendanceStatus::Absent)
        .count() as u64;
    let rejected = statuses.iter().filter(|s| s.rank() == 0).count() as u64;
    let attended = on_time + late;

    AttendanceSummary {
        student_id,
        class_id,
        total_sessions,
        attended,
        on_time,
        late,
        absent,
        rejected,
        percentage: percentage(attended, total_sessions),
    }
}

/// Attendance percentage rounded half-up to two decimals.
///
/// `None` when no session has been held; the caller reports "no data" instead
/// of a fabricated zero.
pub fn percentage(attended: u64, total_sessions: u64) -> Option<f64> {
    if total_sessions == 0 {
        return None;
    }
    let raw = attended as f64 / total_sessions as f64 * 100.0;
    Some((raw * 100.0).round() / 100.0)
}
