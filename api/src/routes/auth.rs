use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};
use util::state::AppState;
use validator::Validate;

use db::models::user;

use crate::auth::generate_jwt;
use crate::response::ApiResponse;

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

#[derive(Deserialize, Validate)]
pub struct LoginReq {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Serialize, Default)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user: Option<UserDto>,
}

#[derive(Serialize)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub admin: bool,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginReq>,
) -> (StatusCode, Json<ApiResponse<LoginResponse>>) {
    if let Err(errors) = body.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(errors.to_string())),
        );
    }

    match user::Model::verify_credentials(state.db(), &body.username, &body.password).await {
        Ok(Some(user)) => {
            let (token, expires_at) = generate_jwt(user.id, user.admin);
            (
                StatusCode::OK,
                Json(ApiResponse::success(
                    LoginResponse {
                        token,
                        expires_at,
                        user: Some(UserDto {
                            id: user.id,
                            username: user.username,
                            email: user.email,
                            admin: user.admin,
                        }),
                    },
                    "Logged in",
                )),
            )
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid username or password")),
        ),
        Err(err) => {
            tracing::error!("login failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Could not process login")),
            )
        }
    }
}
