use async_trait::async_trait;
use db::models::{class, enrollment, user};
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::seed::Seeder;

pub struct EnrollmentSeeder;

#[async_trait]
impl Seeder for EnrollmentSeeder {
    async fn seed(&self, db: &DatabaseConnection) {
        let users = user::Entity::find()
            .all(db)
            .await
            .expect("Failed to fetch users");
        let classes = class::Entity::find()
            .all(db)
            .await
            .expect("Failed to fetch classes");

        for (i, u) in users.iter().enumerate() {
            if u.admin {
                continue;
            }
            if let Some(c) = classes.get(i % classes.len()) {
                let role = if u.username == "u00000002" {
                    enrollment::Role::Lecturer
                } else {
                    enrollment::Role::Student
                };
                let _ = enrollment::Model::enroll(db, u.id, c.id, role).await;
            }
        }
    }
}
