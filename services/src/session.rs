//! Class session lifecycle: `scheduled -> in_progress -> {completed, cancelled}`.
//!
//! Starting a session issues its first QR token; rotation replaces the token
//! and immediately invalidates the previous one for future scans (already
//! accepted scans are untouched). Status changes go through guarded updates
//! filtered on the expected current status, so two concurrent writers
//! serialize on the row and the loser observes zero affected rows.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use util::bus::EventBus;

use db::events::AttendanceEvent;
use db::models::class_session::{Column, Entity, Model, SessionStatus};
use db::models::enrollment;

use crate::error::AttendanceError;
use crate::ledger::{AttendanceLedger, RecordDraft};
use crate::token;

pub struct SessionService;

impl SessionService {
    /// Starts a scheduled session: issues the first token and opens scanning.
    ///
    /// Fails with `AlreadyActive` when this class already has an in-progress
    /// session on the same date (or when this session itself is already
    /// running); terminal sessions fail with `SessionNotActive`.
    pub async fn start(
        db: &DatabaseConnection,
        events: &EventBus,
        class_id: i64,
        session_id: i64,
        lecturer_id: i64,
        now: DateTime<Utc>,
        validity_minutes: i64,
    ) -> Result<Model, AttendanceError> {
        let session = Self::find(db, class_id, session_id).await?;

        match session.status {
            SessionStatus::Scheduled => {}
            SessionStatus::InProgress => return Err(AttendanceError::AlreadyActive),
            SessionStatus::Completed | SessionStatus::Cancelled => {
                return Err(AttendanceError::SessionNotActive);
            }
        }

        if Self::active_session_on_date(db, class_id, session.scheduled_start).await? {
            return Err(AttendanceError::AlreadyActive);
        }

        let new_token = token::generate_token();
        let expires_at = now + Duration::minutes(validity_minutes);

        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SessionStatus::InProgress))
            .col_expr(Column::StartedBy, Expr::value(lecturer_id))
            .col_expr(Column::Token, Expr::value(new_token))
            .col_expr(Column::TokenIssuedAt, Expr::value(now))
            .col_expr(Column::TokenExpiresAt, Expr::value(expires_at))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(session_id))
            .filter(Column::Status.eq(SessionStatus::Scheduled))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            // Raced with another starter; the session is no longer scheduled.
            return Err(AttendanceError::AlreadyActive);
        }

        let session = Self::find(db, class_id, session_id).await?;
        Self::publish(
            events,
            AttendanceEvent::SessionStarted {
                session_id,
                class_id,
                started_by: lecturer_id,
                token_expires_at: expires_at,
            },
        )
        .await;
        Ok(session)
    }

    /// Replaces the live token and resets the expiry window.
    ///
    /// The previous token becomes invalid for all future scans. When two
    /// rotations race, the guarded update serializes them; both observe a
    /// success and the row ends up with the last writer's token, which the
    /// caller re-reads and displays.
    pub async fn rotate_token(
        db: &DatabaseConnection,
        events: &EventBus,
        class_id: i64,
        session_id: i64,
        now: DateTime<Utc>,
        validity_minutes: i64,
    ) -> Result<Model, AttendanceError> {
        // Existence first, so an unknown id is NotFound rather than inactive.
        Self::find(db, class_id, session_id).await?;

        let new_token = token::generate_token();
        let expires_at = now + Duration::minutes(validity_minutes);

        let result = Entity::update_many()
            .col_expr(Column::Token, Expr::value(new_token))
            .col_expr(Column::TokenIssuedAt, Expr::value(now))
            .col_expr(Column::TokenExpiresAt, Expr::value(expires_at))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(session_id))
            .filter(Column::Status.eq(SessionStatus::InProgress))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AttendanceError::SessionNotActive);
        }

        let session = Self::find(db, class_id, session_id).await?;
        Self::publish(
            events,
            AttendanceEvent::TokenRotated {
                session_id,
                token_expires_at: expires_at,
            },
        )
        .await;
        Ok(session)
    }

    /// Returns the live token for QR display.
    ///
    /// Signals `TokenExpired` when the window has lapsed; the lecturer rotates
    /// to continue.
    pub fn current_token(session: &Model, now: DateTime<Utc>) -> Result<&str, AttendanceError> {
        if session.status != SessionStatus::InProgress {
            return Err(AttendanceError::SessionNotActive);
        }
        let live = session
            .token_expires_at
            .is_some_and(|expires| now < expires);
        if !live {
            return Err(AttendanceError::TokenExpired);
        }
        session
            .token
            .as_deref()
            .ok_or(AttendanceError::SessionNotActive)
    }

    /// Moves a session to a terminal state.
    ///
    /// `completed` requires the session to be running and back-fills `absent`
    /// records for enrolled students who never produced one; `cancelled` is
    /// allowed from `scheduled` or `in_progress`. Scans that land after the
    /// transition fail their session-state check; nothing already accepted is
    /// invalidated.
    pub async fn end(
        db: &DatabaseConnection,
        events: &EventBus,
        class_id: i64,
        session_id: i64,
        outcome: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<Model, AttendanceError> {
        if !outcome.is_terminal() {
            return Err(AttendanceError::SessionNotActive);
        }

        let session = Self::find(db, class_id, session_id).await?;
        if session.status.is_terminal() {
            return Err(AttendanceError::SessionNotActive);
        }
        if outcome == SessionStatus::Completed && session.status != SessionStatus::InProgress {
            return Err(AttendanceError::SessionNotActive);
        }

        let from_status = session.status.clone();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(outcome.clone()))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(session_id))
            .filter(Column::Status.eq(from_status))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AttendanceError::SessionNotActive);
        }

        if outcome == SessionStatus::Completed {
            Self::backfill_absences(db, class_id, session_id).await?;
        }

        let session = Self::find(db, class_id, session_id).await?;
        Self::publish(
            events,
            AttendanceEvent::SessionEnded {
                session_id,
                class_id,
                outcome,
            },
        )
        .await;
        Ok(session)
    }

    pub async fn find(
        db: &DatabaseConnection,
        class_id: i64,
        session_id: i64,
    ) -> Result<Model, AttendanceError> {
        Entity::find()
            .filter(Column::Id.eq(session_id))
            .filter(Column::ClassId.eq(class_id))
            .one(db)
            .await?
            .ok_or(AttendanceError::SessionNotFound)
    }

    /// Whether the class already has an in-progress session on the given date.
    async fn active_session_on_date(
        db: &DatabaseConnection,
        class_id: i64,
        scheduled_start: DateTime<Utc>,
    ) -> Result<bool, AttendanceError> {
        let day_start = scheduled_start
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        let day_end = day_start + Duration::days(1);

        let count = Entity::find()
            .filter(Column::ClassId.eq(class_id))
            .filter(Column::Status.eq(SessionStatus::InProgress))
            .filter(Column::ScheduledStart.gte(day_start))
            .filter(Column::ScheduledStart.lt(day_end))
            .count(db)
            .await?;
        Ok(count > 0)
    }

    /// Writes `absent` for every enrolled student without a record.
    ///
    /// Goes through the ledger so an earlier persisted rejection upgrades to
    /// `absent` while accepted scans are left alone.
    async fn backfill_absences(
        db: &DatabaseConnection,
        class_id: i64,
        session_id: i64,
    ) -> Result<(), AttendanceError> {
        let students = enrollment::Model::student_ids_for_class(db, class_id).await?;
        for student_id in students {
            AttendanceLedger::append(db, RecordDraft::absent(session_id, student_id)).await?;
        }
        Ok(())
    }

    async fn publish(events: &EventBus, event: AttendanceEvent) {
        if let Ok(payload) = serde_json::to_string(&event) {
            events.publish(&event.topic(), payload).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use db::models::attendance_record::AttendanceStatus;
    use db::models::{class, user};
    use db::test_utils::setup_test_db;
    use sea_orm::{ActiveModelTrait, Set};

    struct Fixture {
        lecturer: user::Model,
        student: user::Model,
        class: class::Model,
        session: Model,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    async fn fixture(db: &DatabaseConnection) -> Fixture {
        let lecturer = user::Model::create(db, "lect1", "lect1@test.com", "pw", false)
            .await
            .unwrap();
        let student = user::Model::create(db, "stud1", "stud1@test.com", "pw", false)
            .await
            .unwrap();
        let c = class::Model::create(db, "COS212", "Data Structures", 2026)
            .await
            .unwrap();
        enrollment::Model::enroll(db, lecturer.id, c.id, enrollment::Role::Lecturer)
            .await
            .unwrap();
        enrollment::Model::enroll(db, student.id, c.id, enrollment::Role::Student)
            .await
            .unwrap();

        let now = Utc::now();
        let session = db::models::class_session::ActiveModel {
            class_id: Set(c.id),
            scheduled_start: Set(t0()),
            scheduled_end: Set(t0() + Duration::hours(1)),
            status: Set(SessionStatus::Scheduled),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        Fixture {
            lecturer,
            student,
            class: c,
            session,
        }
    }

    #[tokio::test]
    async fn test_start_issues_token_and_opens_session() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        let started = SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap();

        assert_eq!(started.status, SessionStatus::InProgress);
        assert_eq!(started.started_by, Some(f.lecturer.id));
        let token = started.token.as_deref().unwrap();
        assert_eq!(token.len(), 64);
        assert_eq!(
            started.token_expires_at,
            Some(t0() + Duration::minutes(15))
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_already_active() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap();

        let err = SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0() + Duration::minutes(1),
            15,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AttendanceError::AlreadyActive));
    }

    #[tokio::test]
    async fn test_start_blocked_by_sibling_session_same_day() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        // A second scheduled session of the same class on the same day.
        let now = Utc::now();
        let sibling = db::models::class_session::ActiveModel {
            class_id: Set(f.class.id),
            scheduled_start: Set(t0() + Duration::hours(4)),
            scheduled_end: Set(t0() + Duration::hours(5)),
            status: Set(SessionStatus::Scheduled),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap();

        let err = SessionService::start(
            &db,
            &events,
            f.class.id,
            sibling.id,
            f.lecturer.id,
            t0() + Duration::hours(4),
            15,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AttendanceError::AlreadyActive));
    }

    #[tokio::test]
    async fn test_rotate_replaces_token_and_resets_window() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        let started = SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap();
        let first_token = started.token.clone().unwrap();

        let rotated = SessionService::rotate_token(
            &db,
            &events,
            f.class.id,
            f.session.id,
            t0() + Duration::minutes(16),
            15,
        )
        .await
        .unwrap();

        assert_ne!(rotated.token.as_deref(), Some(first_token.as_str()));
        assert_eq!(
            rotated.token_expires_at,
            Some(t0() + Duration::minutes(31))
        );
    }

    #[tokio::test]
    async fn test_rotate_requires_active_session() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        let err = SessionService::rotate_token(&db, &events, f.class.id, f.session.id, t0(), 15)
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::SessionNotActive));
    }

    #[tokio::test]
    async fn test_current_token_expires() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        let started = SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap();

        assert!(SessionService::current_token(&started, t0() + Duration::minutes(14)).is_ok());
        let err =
            SessionService::current_token(&started, t0() + Duration::minutes(15)).unwrap_err();
        assert!(matches!(err, AttendanceError::TokenExpired));
    }

    #[tokio::test]
    async fn test_complete_backfills_absent_students() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap();

        let ended = SessionService::end(
            &db,
            &events,
            f.class.id,
            f.session.id,
            SessionStatus::Completed,
            t0() + Duration::hours(1),
        )
        .await
        .unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);

        let record = AttendanceLedger::record_for(&db, f.session.id, f.student.id)
            .await
            .unwrap()
            .expect("absent record back-filled");
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert!(record.checkin_time.is_none());
    }

    #[tokio::test]
    async fn test_no_transition_out_of_terminal_state() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        SessionService::end(
            &db,
            &events,
            f.class.id,
            f.session.id,
            SessionStatus::Cancelled,
            t0(),
        )
        .await
        .unwrap();

        let err = SessionService::end(
            &db,
            &events,
            f.class.id,
            f.session.id,
            SessionStatus::Completed,
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AttendanceError::SessionNotActive));

        let err = SessionService::start(
            &db,
            &events,
            f.class.id,
            f.session.id,
            f.lecturer.id,
            t0(),
            15,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AttendanceError::SessionNotActive));
    }

    #[tokio::test]
    async fn test_cancel_scheduled_session_is_allowed() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        let ended = SessionService::end(
            &db,
            &events,
            f.class.id,
            f.session.id,
            SessionStatus::Cancelled,
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(ended.status, SessionStatus::Cancelled);

        // Cancellation does not back-fill absences.
        let record = AttendanceLedger::record_for(&db, f.session.id, f.student.id)
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_end_publishes_event() {
        let db = setup_test_db().await;
        let events = EventBus::new();
        let f = fixture(&db).await;

        let mut rx = events
            .subscribe(&AttendanceEvent::session_topic(f.session.id))
            .await;

        SessionService::end(
            &db,
            &events,
            f.class.id,
            f.session.id,
            SessionStatus::Cancelled,
            t0(),
        )
        .await
        .unwrap();

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "session_ended");
        assert_eq!(value["data"]["outcome"], "cancelled");
    }
}
