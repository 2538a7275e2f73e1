use async_trait::async_trait;
use db::models::class::Model;
use sea_orm::DatabaseConnection;

use crate::seed::Seeder;

pub struct ClassSeeder;

#[async_trait]
impl Seeder for ClassSeeder {
    async fn seed(&self, db: &DatabaseConnection) {
        let _ = Model::create(db, "COS212", "Data Structures and Algorithms", 2026).await;
        let _ = Model::create(db, "COS301", "Software Engineering", 2026).await;
        let _ = Model::create(db, "STK110", "Statistics", 2026).await;
    }
}
