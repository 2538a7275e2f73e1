//! Route-level tests for the session lifecycle and scan verification.

mod helpers;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use api::auth::generate_jwt;
use db::models::attendance_record::{
    AttendanceStatus, Column as RecordCol, Entity as RecordEntity,
};
use db::models::class_session::{Column as SessionCol, Entity as SessionEntity};

use helpers::app::{body_json, get_request, json_request, make_test_app, seed, send};

async fn start_session_token(
    app: &axum::Router,
    ctx: &helpers::app::TestCtx,
    lecturer_token: &str,
) -> String {
    let uri = format!(
        "/api/classes/{}/sessions/{}/start",
        ctx.class.id, ctx.session.id
    );
    let resp = send(app, json_request("POST", &uri, lecturer_token, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_start_session_returns_token() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (token, _) = generate_jwt(ctx.lecturer.id, false);

    let qr = start_session_token(&app, &ctx, &token).await;
    assert_eq!(qr.len(), 64);
    assert!(qr.chars().all(|c| c.is_ascii_hexdigit()));

    // Session row now carries the open state.
    let session = SessionEntity::find()
        .filter(SessionCol::Id.eq(ctx.session.id))
        .one(state.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.started_by, Some(ctx.lecturer.id));
    assert!(session.token_expires_at.is_some());
}

#[tokio::test]
async fn test_start_session_forbidden_for_student() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (token, _) = generate_jwt(ctx.student.id, false);

    let uri = format!(
        "/api/classes/{}/sessions/{}/start",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &uri, &token, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_start_twice_conflicts() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (token, _) = generate_jwt(ctx.lecturer.id, false);

    start_session_token(&app, &ctx, &token).await;

    let uri = format!(
        "/api/classes/{}/sessions/{}/start",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &uri, &token, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["kind"], "ALREADY_ACTIVE");
}

#[tokio::test]
async fn test_scan_within_grace_is_on_time() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;

    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &uri, &stud, json!({ "token": qr }))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "on_time");
}

#[tokio::test]
async fn test_second_scan_echoes_original_record() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;
    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );

    let first = send(&app, json_request("POST", &uri, &stud, json!({ "token": qr }))).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, json_request("POST", &uri, &stud, json!({ "token": qr }))).await;
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["message"], "Attendance already recorded");
    assert_eq!(body["data"]["status"], "on_time");

    // Still exactly one ledger row for the pair.
    let rows = RecordEntity::find()
        .filter(RecordCol::SessionId.eq(ctx.session.id))
        .filter(RecordCol::StudentId.eq(ctx.student.id))
        .all(state.db())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AttendanceStatus::OnTime);
}

#[tokio::test]
async fn test_wrong_token_rejected_and_audited() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    start_session_token(&app, &ctx, &lect).await;

    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(
        &app,
        json_request("POST", &uri, &stud, json!({ "token": "not-the-token" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["kind"], "INVALID_TOKEN");

    // The rejection is persisted for auditing.
    let record = RecordEntity::find_by_id((ctx.session.id, ctx.student.id))
        .one(state.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::RejectedInvalidToken);
}

#[tokio::test]
async fn test_rotation_invalidates_previous_token() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let old_token = start_session_token(&app, &ctx, &lect).await;

    let rotate_uri = format!(
        "/api/classes/{}/sessions/{}/rotate",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &rotate_uri, &lect, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let new_token = body_json(resp).await["data"]["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(old_token, new_token);

    // The old token must fail as invalid, not expired.
    let scan_uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(
        &app,
        json_request("POST", &scan_uri, &stud, json!({ "token": old_token })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["kind"], "INVALID_TOKEN");

    // The new token is accepted.
    let resp = send(
        &app,
        json_request("POST", &scan_uri, &stud, json!({ "token": new_token })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_token_is_gone() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;

    // Age the token past its window.
    SessionEntity::update_many()
        .col_expr(
            SessionCol::TokenExpiresAt,
            Expr::value(Utc::now() - Duration::minutes(1)),
        )
        .filter(SessionCol::Id.eq(ctx.session.id))
        .exec(state.db())
        .await
        .unwrap();

    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &uri, &stud, json!({ "token": qr }))).await;
    assert_eq!(resp.status(), StatusCode::GONE);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["kind"], "TOKEN_EXPIRED");

    let record = RecordEntity::find_by_id((ctx.session.id, ctx.student.id))
        .one(state.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::RejectedExpiredToken);

    // The lecturer-facing token view reports the same condition.
    let token_uri = format!(
        "/api/classes/{}/sessions/{}/token",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, get_request(&token_uri, &lect)).await;
    assert_eq!(resp.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_geofenced_session_rejects_far_scan() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    // Pin the session to a 100m geofence.
    SessionEntity::update_many()
        .col_expr(SessionCol::LocationLat, Expr::value(-25.7545))
        .col_expr(SessionCol::LocationLng, Expr::value(28.2314))
        .col_expr(SessionCol::LocationRadiusM, Expr::value(100.0))
        .filter(SessionCol::Id.eq(ctx.session.id))
        .exec(state.db())
        .await
        .unwrap();

    let qr = start_session_token(&app, &ctx, &lect).await;
    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );

    // Roughly 200m north of the room.
    let resp = send(
        &app,
        json_request(
            "POST",
            &uri,
            &stud,
            json!({ "token": qr, "latitude": -25.7527, "longitude": 28.2314 }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["kind"], "LOCATION_MISMATCH");
    assert!(body["data"]["distance_m"].as_f64().unwrap() > 100.0);

    // Inside the fence the same token is accepted.
    let resp = send(
        &app,
        json_request(
            "POST",
            &uri,
            &stud,
            json!({ "token": qr, "latitude": -25.7546, "longitude": 28.2315 }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_scan_forbidden_for_non_member() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (outsider, _) = generate_jwt(ctx.outsider.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;
    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(
        &app,
        json_request("POST", &uri, &outsider, json!({ "token": qr })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_lecturer_scan_rejected_not_enrolled_as_student() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;
    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &uri, &lect, json!({ "token": qr }))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["kind"], "NOT_ENROLLED");
}

#[tokio::test]
async fn test_complete_session_backfills_absences_and_lists_roster() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;
    let scan_uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    send(&app, json_request("POST", &scan_uri, &stud, json!({ "token": qr }))).await;

    let end_uri = format!(
        "/api/classes/{}/sessions/{}/end",
        ctx.class.id, ctx.session.id
    );
    let resp = send(
        &app,
        json_request("POST", &end_uri, &lect, json!({ "outcome": "completed" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // student scanned, student2 was back-filled absent.
    let records_uri = format!(
        "/api/classes/{}/sessions/{}/records",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, get_request(&records_uri, &lect)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let records = body["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);

    let by_student: std::collections::HashMap<i64, &str> = records
        .iter()
        .map(|r| {
            (
                r["student_id"].as_i64().unwrap(),
                r["status"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(by_student[&ctx.student.id], "on_time");
    assert_eq!(by_student[&ctx.student2.id], "absent");
}

#[tokio::test]
async fn test_scan_after_cancellation_is_rejected() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;

    let end_uri = format!(
        "/api/classes/{}/sessions/{}/end",
        ctx.class.id, ctx.session.id
    );
    send(
        &app,
        json_request("POST", &end_uri, &lect, json!({ "outcome": "cancelled" })),
    )
    .await;

    let scan_uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    let resp = send(&app, json_request("POST", &scan_uri, &stud, json!({ "token": qr }))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp).await;
    assert_eq!(body["data"]["kind"], "SESSION_NOT_ACTIVE");
}

#[tokio::test]
async fn test_correction_overrides_stored_outcome() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    let qr = start_session_token(&app, &ctx, &lect).await;
    let scan_uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    send(&app, json_request("POST", &scan_uri, &stud, json!({ "token": qr }))).await;

    let end_uri = format!(
        "/api/classes/{}/sessions/{}/end",
        ctx.class.id, ctx.session.id
    );
    send(
        &app,
        json_request("POST", &end_uri, &lect, json!({ "outcome": "completed" })),
    )
    .await;

    // Lecturer overrides the accepted scan to absent after completion.
    let correct_uri = format!(
        "/api/classes/{}/sessions/{}/records/{}",
        ctx.class.id, ctx.session.id, ctx.student.id
    );
    let resp = send(
        &app,
        json_request("PUT", &correct_uri, &lect, json!({ "status": "absent" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let record = RecordEntity::find_by_id((ctx.session.id, ctx.student.id))
        .one(state.db())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, AttendanceStatus::Absent);
}

#[tokio::test]
async fn test_scan_without_body_is_unprocessable() {
    let (app, state) = make_test_app().await;
    let ctx = seed(&state).await;
    let (lect, _) = generate_jwt(ctx.lecturer.id, false);
    let (stud, _) = generate_jwt(ctx.student.id, false);

    start_session_token(&app, &ctx, &lect).await;

    let uri = format!(
        "/api/classes/{}/sessions/{}/scan",
        ctx.class.id, ctx.session.id
    );
    // Missing required "token" field -> axum JSON extractor rejects with 422.
    let resp = send(&app, json_request("POST", &uri, &stud, json!({}))).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
