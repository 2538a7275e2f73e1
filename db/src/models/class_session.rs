use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One scheduled meeting of a class where attendance is taken.
///
/// Sessions are created `scheduled`, move to `in_progress` when the lecturer
/// starts them (which issues the first QR token), and end as `completed` or
/// `cancelled`. Terminal states are never left and rows are never deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "class_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub class_id: i64,
    /// Lecturer who started the session; unset while still scheduled.
    pub started_by: Option<i64>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: SessionStatus,
    /// Live QR token. Only meaningful while `in_progress`; replaced on rotation.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub token_issued_at: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Geofence center; scans are unrestricted when unset.
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub location_radius_m: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, PartialEq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "session_status_type")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SessionStatus {
    #[default]
    #[sea_orm(string_value = "scheduled")]
    Scheduled,

    #[sea_orm(string_value = "in_progress")]
    InProgress,

    #[sea_orm(string_value = "completed")]
    Completed,

    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class::Entity",
        from = "Column::ClassId",
        to = "super::class::Column::Id"
    )]
    Class,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::StartedBy",
        to = "super::user::Column::Id"
    )]
    Starter,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Class.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}
