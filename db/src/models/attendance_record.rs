use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Verification outcome of one student for one session.
///
/// The composite primary key enforces at most one record per
/// (session, student); the ledger's upsert ordering decides which outcome a
/// retried scan may replace.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,

    pub status: AttendanceStatus,
    /// When the accepted scan happened; unset for back-filled absences.
    pub checkin_time: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub device_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, PartialEq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_status_type")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AttendanceStatus {
    #[sea_orm(string_value = "on_time")]
    OnTime,

    #[sea_orm(string_value = "late")]
    Late,

    #[sea_orm(string_value = "absent")]
    Absent,

    #[sea_orm(string_value = "rejected_invalid_token")]
    RejectedInvalidToken,

    #[sea_orm(string_value = "rejected_expired_token")]
    RejectedExpiredToken,

    #[sea_orm(string_value = "rejected_location")]
    RejectedLocation,

    #[sea_orm(string_value = "rejected_duplicate")]
    RejectedDuplicate,
}

impl AttendanceStatus {
    /// True for outcomes that count as attendance.
    pub fn is_attended(&self) -> bool {
        matches!(self, AttendanceStatus::OnTime | AttendanceStatus::Late)
    }

    /// Position in the informativeness order `rejected_* < absent < late <
    /// on_time`; a stored record is only replaced by a strictly higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            AttendanceStatus::RejectedInvalidToken
            | AttendanceStatus::RejectedExpiredToken
            | AttendanceStatus::RejectedLocation
            | AttendanceStatus::RejectedDuplicate => 0,
            AttendanceStatus::Absent => 1,
            AttendanceStatus::Late => 2,
            AttendanceStatus::OnTime => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class_session::Entity",
        from = "Column::SessionId",
        to = "super::class_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StudentId",
        to = "super::user::Column::Id"
    )]
    Student,
}

impl Related<super::class_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}
