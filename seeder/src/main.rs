use crate::seed::{Seeder, run_seeder};
use crate::seeds::{
    class::ClassSeeder, class_session::ClassSessionSeeder, enrollment::EnrollmentSeeder,
    user::UserSeeder,
};

mod seed;
mod seeds;

// Run the migration binary first; the seeder assumes the schema exists.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let db = db::connect().await;

    for (seeder, name) in [
        (Box::new(UserSeeder) as Box<dyn Seeder + Send + Sync>, "User"),
        (Box::new(ClassSeeder), "Class"),
        (Box::new(EnrollmentSeeder), "Enrollment"),
        (Box::new(ClassSessionSeeder), "ClassSession"),
    ] {
        run_seeder(&*seeder, name, &db).await;
    }
}
