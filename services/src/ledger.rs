//! Append-mostly store of verification outcomes.
//!
//! One record per (session, student) is enforced twice: by the composite
//! primary key at the storage layer and by the upsert ordering here. A stored
//! outcome is only replaced by a strictly more informative one
//! (`rejected_* < absent < late < on_time`), so a later invalid retry can
//! never overwrite a valid acceptance.

use chrono::{DateTime, Utc};
use sea_orm::error::SqlErr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};

use db::models::attendance_record::{ActiveModel, AttendanceStatus, Column, Entity, Model};

/// The fields a verification produces for one (session, student) pair.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub session_id: i64,
    pub student_id: i64,
    pub status: AttendanceStatus,
    pub checkin_time: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub device_fingerprint: Option<String>,
}

impl RecordDraft {
    /// A back-filled absence for a student who never scanned.
    pub fn absent(session_id: i64, student_id: i64) -> Self {
        Self {
            session_id,
            student_id,
            status: AttendanceStatus::Absent,
            checkin_time: None,
            latitude: None,
            longitude: None,
            device_fingerprint: None,
        }
    }
}

pub struct AttendanceLedger;

impl AttendanceLedger {
    /// Upserts a draft under the informativeness ordering.
    ///
    /// Returns the stored record and whether the draft was actually written.
    /// A concurrent first-insert race surfaces as a unique-constraint
    /// violation; the loser re-reads the winner's row and falls back into the
    /// same ordering rule instead of failing.
    pub async fn append(db: &DatabaseConnection, draft: RecordDraft) -> Result<(Model, bool), DbErr> {
        let existing = Entity::find_by_id((draft.session_id, draft.student_id))
            .one(db)
            .await?;

        match existing {
            Some(current) => Self::replace_if_better(db, current, draft).await,
            None => {
                let now = Utc::now();
                let insert = ActiveModel {
                    session_id: Set(draft.session_id),
                    student_id: Set(draft.student_id),
                    status: Set(draft.status.clone()),
                    checkin_time: Set(draft.checkin_time),
                    latitude: Set(draft.latitude),
                    longitude: Set(draft.longitude),
                    device_fingerprint: Set(draft.device_fingerprint.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                match insert.insert(db).await {
                    Ok(model) => Ok((model, true)),
                    Err(err)
                        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                    {
                        // Lost the insert race; apply the ordering against the winner.
                        let current = Entity::find_by_id((draft.session_id, draft.student_id))
                            .one(db)
                            .await?
                            .ok_or_else(|| {
                                DbErr::RecordNotFound(
                                    "attendance record vanished after conflict".into(),
                                )
                            })?;
                        Self::replace_if_better(db, current, draft).await
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    async fn replace_if_better(
        db: &DatabaseConnection,
        current: Model,
        draft: RecordDraft,
    ) -> Result<(Model, bool), DbErr> {
        if draft.status.rank() <= current.status.rank() {
            return Ok((current, false));
        }

        let mut active: ActiveModel = current.into();
        active.status = Set(draft.status);
        active.checkin_time = Set(draft.checkin_time);
        active.latitude = Set(draft.latitude);
        active.longitude = Set(draft.longitude);
        active.device_fingerprint = Set(draft.device_fingerprint);
        active.updated_at = Set(Utc::now());
        Ok((active.update(db).await?, true))
    }

    /// Writes a draft unconditionally, ignoring the ordering rule.
    ///
    /// Reserved for lecturer/admin corrections, which are an explicit override
    /// of whatever the scan flow stored.
    pub async fn put(db: &DatabaseConnection, draft: RecordDraft) -> Result<Model, DbErr> {
        let existing = Entity::find_by_id((draft.session_id, draft.student_id))
            .one(db)
            .await?;
        let now = Utc::now();

        match existing {
            Some(current) => {
                let mut active: ActiveModel = current.into();
                active.status = Set(draft.status);
                active.checkin_time = Set(draft.checkin_time);
                active.latitude = Set(draft.latitude);
                active.longitude = Set(draft.longitude);
                active.device_fingerprint = Set(draft.device_fingerprint);
                active.updated_at = Set(now);
                active.update(db).await
            }
            None => {
                ActiveModel {
                    session_id: Set(draft.session_id),
                    student_id: Set(draft.student_id),
                    status: Set(draft.status),
                    checkin_time: Set(draft.checkin_time),
                    latitude: Set(draft.latitude),
                    longitude: Set(draft.longitude),
                    device_fingerprint: Set(draft.device_fingerprint),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await
            }
        }
    }

    pub async fn record_for(
        db: &DatabaseConnection,
        session_id: i64,
        student_id: i64,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id((session_id, student_id)).one(db).await
    }

    /// All records for one session, for lecturer-facing roster views.
    pub async fn records_for_session(
        db: &DatabaseConnection,
        session_id: i64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::StudentId)
            .all(db)
            .await
    }

    /// A student's records across the given sessions, returned in the order
    /// the session ids are given (callers pass them session-date ascending).
    pub async fn records_for_student(
        db: &DatabaseConnection,
        student_id: i64,
        session_ids: &[i64],
    ) -> Result<Vec<Model>, DbErr> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut records = Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::SessionId.is_in(session_ids.iter().copied()))
            .all(db)
            .await?;
        let position: std::collections::HashMap<i64, usize> = session_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        records.sort_by_key(|r| position.get(&r.session_id).copied().unwrap_or(usize::MAX));
        Ok(records)
    }
}
