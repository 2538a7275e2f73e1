use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, DbErr, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Membership of a user in a class, with the role they hold there.
///
/// A scan is only valid when a `student` enrollment exists; `lecturer`
/// enrollments gate session management.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    /// User ID (foreign key to `users`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,

    /// Class ID (foreign key to `classes`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub class_id: i64,

    /// Role type: Lecturer or Student
    pub role: Role,
}

/// Enum representing user roles within a class.
#[derive(
    Debug, Clone, PartialEq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "enrollment_role_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[sea_orm(string_value = "lecturer")]
    Lecturer,

    #[sea_orm(string_value = "student")]
    Student,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::class::Entity",
        from = "Column::ClassId",
        to = "super::class::Column::Id"
    )]
    Class,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Class.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Enrolls a user into a class with the given role.
    pub async fn enroll(
        db: &DatabaseConnection,
        user_id: i64,
        class_id: i64,
        role: Role,
    ) -> Result<Self, DbErr> {
        let active = ActiveModel {
            user_id: Set(user_id),
            class_id: Set(class_id),
            role: Set(role),
        };
        active.insert(db).await
    }

    /// Returns the role the user holds in the class, if any.
    pub async fn role_in_class(
        db: &DatabaseConnection,
        user_id: i64,
        class_id: i64,
    ) -> Result<Option<Role>, DbErr> {
        Ok(Entity::find_by_id((user_id, class_id))
            .one(db)
            .await?
            .map(|e| e.role))
    }

    /// True when the user holds exactly `role` in the class.
    pub async fn is_in_role(
        db: &DatabaseConnection,
        user_id: i64,
        class_id: i64,
        role: Role,
    ) -> Result<bool, DbErr> {
        Ok(Self::role_in_class(db, user_id, class_id).await? == Some(role))
    }

    /// All student user ids enrolled in a class.
    pub async fn student_ids_for_class(
        db: &DatabaseConnection,
        class_id: i64,
    ) -> Result<Vec<i64>, DbErr> {
        Ok(Entity::find()
            .filter(Column::ClassId.eq(class_id))
            .filter(Column::Role.eq(Role::Student))
            .all(db)
            .await?
            .into_iter()
            .map(|e| e.user_id)
            .collect())
    }

    /// Class ids the user is enrolled in as a student.
    pub async fn class_ids_for_student(
        db: &DatabaseConnection,
        user_id: i64,
    ) -> Result<Vec<i64>, DbErr> {
        Ok(Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Role.eq(Role::Student))
            .all(db)
            .await?
            .into_iter()
            .map(|e| e.class_id)
            .collect())
    }
}
