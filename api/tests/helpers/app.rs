use axum::Router;
use axum::body::Body;
use axum::http::Request;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tower::ServiceExt;
use util::{bus::EventBus, state::AppState};

use api::routes::routes;
use db::models::{class, class_session, enrollment, user};
use db::test_utils::setup_test_db;

/// Builds an app over a fresh in-memory database.
pub async fn make_test_app() -> (Router, AppState) {
    let db = setup_test_db().await;
    let state = AppState::new(db, EventBus::new());
    let app = Router::new().nest("/api", routes(state.clone()));
    (app, state)
}

/// A seeded class with one lecturer, two students, and one scheduled session.
pub struct TestCtx {
    pub lecturer: user::Model,
    pub student: user::Model,
    pub student2: user::Model,
    pub outsider: user::Model,
    pub class: class::Model,
    pub session: class_session::Model,
}

/// Session start a few minutes ago, so an immediate scan lands inside the
/// lateness grace window.
pub fn session_start() -> DateTime<Utc> {
    Utc::now() - Duration::minutes(5)
}

/// Creates an extra scheduled session for the class, offset from now.
pub async fn schedule_session_at(
    state: &AppState,
    class_id: i64,
    start: DateTime<Utc>,
) -> class_session::Model {
    let now = Utc::now();
    class_session::ActiveModel {
        class_id: Set(class_id),
        scheduled_start: Set(start),
        scheduled_end: Set(start + Duration::hours(1)),
        status: Set(class_session::SessionStatus::Scheduled),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(state.db())
    .await
    .unwrap()
}

pub async fn seed(state: &AppState) -> TestCtx {
    let db = state.db();

    let lecturer = user::Model::create(db, "lect1", "lect1@test.com", "password", false)
        .await
        .unwrap();
    let student = user::Model::create(db, "stud1", "stud1@test.com", "password", false)
        .await
        .unwrap();
    let student2 = user::Model::create(db, "stud2", "stud2@test.com", "password", false)
        .await
        .unwrap();
    let outsider = user::Model::create(db, "outsider", "outsider@test.com", "password", false)
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
    enrollment::Model::enroll(db, student2.id, c.id, enrollment::Role::Student)
        .await
        .unwrap();

    let now = Utc::now();
    let session = class_session::ActiveModel {
        class_id: Set(c.id),
        scheduled_start: Set(session_start()),
        scheduled_end: Set(session_start() + Duration::hours(1)),
        status: Set(class_session::SessionStatus::Scheduled),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    TestCtx {
        lecturer,
        student,
        student2,
        outsider,
        class: c,
        session,
    }
}

pub fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Sends one request through the router.
pub async fn send(app: &Router, req: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(req).await.unwrap()
}
