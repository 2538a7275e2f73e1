use async_trait::async_trait;
use db::models::user::Model;
use fake::{Fake, faker::internet::en::SafeEmail};
use sea_orm::DatabaseConnection;

use crate::seed::Seeder;

pub struct UserSeeder;

#[async_trait]
impl Seeder for UserSeeder {
    async fn seed(&self, db: &DatabaseConnection) {
        // Fixed admin user
        let _ = Model::create(db, "u00000001", "admin@example.com", "password123", true).await;

        // Fixed lecturer and student for demo logins
        let _ = Model::create(db, "u00000002", "lecturer@example.com", "password123", false).await;
        let _ = Model::create(db, "u00000003", "student@example.com", "password123", false).await;

        // Random students
        for _ in 0..12 {
            let username = format!("u{:08}", fastrand::u32(..100_000_000));
            let email: String = SafeEmail().fake();
            let _ = Model::create(db, &username, &email, "password123", false).await;
        }
    }
}
