use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{CreateUserRequest, PublicUser, UpdateUserRequest, UserEnvelope};
use super::repo_types::User;
use super::services::register_user;
use crate::{auth::jwt::AuthUser, error::ApiError, response::ApiResponse, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users", post(create_user))
        .route("/users/me", put(update_me))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<Json<ApiResponse<Vec<PublicUser>>>, ApiError> {
    let users = User::list_all(&state.db).await?;
    Ok(Json(ApiResponse::data(
        users.into_iter().map(PublicUser::from).collect(),
    )))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<UserEnvelope>>), ApiError> {
    let Json(payload) = payload?;
    let user = register_user(&state.db, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "User created successfully",
            UserEnvelope { user: user.into() },
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<UserEnvelope>>, ApiError> {
    let Json(changes) = payload?;
    if changes.monthly_budget.is_some_and(|b| !b.is_finite() || b < 0.0) {
        return Err(ApiError::validation("monthlyBudget must be a non-negative number"));
    }

    let user = User::update_profile(&state.db, user_id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!(%user_id, "profile updated");
    Ok(Json(ApiResponse::ok(
        "Profile updated",
        UserEnvelope { user: user.into() },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::auth::jwt::JwtKeys;

    fn server() -> (TestServer, AppState) {
        let state = AppState::fake();
        let server = TestServer::new(user_routes().with_state(state.clone()))
            .expect("Could not create test server.");
        (server, state)
    }

    #[tokio::test]
    async fn create_user_validates_before_storage() {
        let (server, _) = server();
        let res = server
            .post("/users")
            .json(&json!({ "firstName": "Ada", "email": "ada@example.com" }))
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = res.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Missing required fields");
    }

    #[tokio::test]
    async fn listing_users_needs_a_token() {
        let (server, _) = server();
        server.get("/users").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn negative_budget_is_rejected() {
        let (server, state) = server();
        let token = JwtKeys::from_config(&state.config.jwt)
            .sign_access(Uuid::new_v4())
            .unwrap();
        server
            .put("/users/me")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            )
            .json(&json!({ "monthlyBudget": -5.0 }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
