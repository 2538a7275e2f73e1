use async_trait::async_trait;
use chrono::{Duration, Utc};
use db::models::{class, class_session};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::seed::Seeder;

pub struct ClassSessionSeeder;

#[async_trait]
impl Seeder for ClassSessionSeeder {
    async fn seed(&self, db: &DatabaseConnection) {
        let classes = class::Entity::find()
            .all(db)
            .await
            .expect("Failed to fetch classes");
        let now = Utc::now();

        for c in classes {
            // A handful of upcoming weekly slots per class.
            for week in 0..4 {
                let start = now + Duration::days(7 * week) + Duration::hours(1);
                let session = class_session::ActiveModel {
                    class_id: Set(c.id),
                    scheduled_start: Set(start),
                    scheduled_end: Set(start + Duration::hours(1)),
                    status: Set(class_session::SessionStatus::Scheduled),
                    location_lat: Set(Some(-25.7545)),
                    location_lng: Set(Some(28.2314)),
                    location_radius_m: Set(Some(100.0)),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                let _ = session.insert(db).await;
            }
        }
    }
}
