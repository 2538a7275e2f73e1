use std::collections::HashMap;

use axum::{
    Json,
    body::Body,
    extract::{FromRequestParts, Path, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use sea_orm::DatabaseConnection;
use util::state::AppState;

use db::models::enrollment::{Model as Enrollment, Role};

use crate::auth::claims::AuthUser;
use crate::response::ApiResponse;

#[derive(serde::Serialize, Default)]
pub struct Empty;

type GuardError = (StatusCode, Json<ApiResponse<Empty>>);

/// Extracts and validates the user from the request, then re-inserts the
/// claims into the request extensions for downstream handlers.
async fn extract_and_insert_authuser(
    req: Request<Body>,
) -> Result<(Request<Body>, AuthUser), GuardError> {
    let (mut parts, body) = req.into_parts();
    let user = AuthUser::from_request_parts(&mut parts, &())
        .await
        .map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error("Authentication required")),
            )
        })?;

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(user.clone());
    Ok((req, user))
}

fn class_id_from(params: &HashMap<String, String>) -> Result<i64, GuardError> {
    params
        .get("class_id")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Invalid class id")),
            )
        })
}

async fn role_or_deny(
    db: &DatabaseConnection,
    user_id: i64,
    class_id: i64,
) -> Result<Option<Role>, GuardError> {
    Enrollment::role_in_class(db, user_id, class_id)
        .await
        .map_err(|e| {
            // Deny on storage error rather than letting the request through.
            tracing::warn!(error = %e, user_id, class_id, "role lookup failed; denying access");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error("Could not verify class membership")),
            )
        })
}

/// Basic guard to ensure the request is authenticated.
pub async fn allow_authenticated(req: Request<Body>, next: Next) -> Result<Response, GuardError> {
    let (req, _user) = extract_and_insert_authuser(req).await?;
    Ok(next.run(req).await)
}

/// Admin-only guard.
pub async fn allow_admin(req: Request<Body>, next: Next) -> Result<Response, GuardError> {
    let (req, user) = extract_and_insert_authuser(req).await?;

    if !user.0.admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Admin access required")),
        ));
    }

    Ok(next.run(req).await)
}

/// Allows the lecturer of the class in the path, or an admin.
pub async fn require_class_lecturer(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, GuardError> {
    let (req, user) = extract_and_insert_authuser(req).await?;
    if user.0.admin {
        return Ok(next.run(req).await);
    }

    let class_id = class_id_from(&params)?;
    match role_or_deny(state.db(), user.0.sub, class_id).await? {
        Some(Role::Lecturer) => Ok(next.run(req).await),
        _ => Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Lecturer access required for this class")),
        )),
    }
}

/// Allows anyone enrolled in the class in the path (either role), or an admin.
pub async fn require_class_member(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, GuardError> {
    let (req, user) = extract_and_insert_authuser(req).await?;
    if user.0.admin {
        return Ok(next.run(req).await);
    }

    let class_id = class_id_from(&params)?;
    match role_or_deny(state.db(), user.0.sub, class_id).await? {
        Some(_) => Ok(next.run(req).await),
        None => Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("You are not a member of this class")),
        )),
    }
}
