use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest},
        jwt::{AuthUser, JwtKeys},
        password::{is_valid_email, verify_password},
    },
    error::ApiError,
    response::ApiResponse,
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser},
        repo_types::User,
        services::register_user,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(get_me))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".into())
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, ApiError> {
    let (token, refresh_token) = JwtKeys::from_ref(state).sign_pair(user.id)?;
    Ok(AuthResponse {
        token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    let Json(payload) = payload?;
    let user = register_user(&state.db, payload).await?;
    let resp = issue_tokens(&state, user)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Registration successful", resp)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let Json(mut payload) = payload?;
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }

    let Some(user) = User::find_by_email(&state.db, &payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(invalid_credentials());
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(invalid_credentials());
    }
    if !user.is_active {
        warn!(user_id = %user.id, "login on deactivated account");
        return Err(ApiError::Forbidden("Account is deactivated".into()));
    }

    User::touch_last_login(&state.db, user.id).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(ApiResponse::ok(
        "Login successful",
        issue_tokens(&state, user)?,
    )))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let Json(payload) = payload?;
    let claims = JwtKeys::from_ref(&state)
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| {
            warn!(error = %e, "refresh rejected");
            ApiError::Unauthorized("Invalid refresh token".into())
        })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    Ok(Json(ApiResponse::ok(
        "Token refreshed",
        issue_tokens(&state, user)?,
    )))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    Ok(Json(ApiResponse::data(user.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json as DbJson;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            first_name: "Test".into(),
            last_name: "User".into(),
            email: "test@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            currency: "USD".into(),
            monthly_budget: 1500.0,
            is_active: true,
            email_verified: false,
            notifications: DbJson(Default::default()),
            profile_picture: String::new(),
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    #[tokio::test]
    async fn issued_tokens_belong_to_user_and_hide_hash() {
        let state = AppState::fake();
        let u = user();
        let id = u.id;
        let resp = issue_tokens(&state, u).expect("tokens");

        let keys = JwtKeys::from_ref(&state);
        assert_eq!(keys.verify(&resp.token).unwrap().sub, id);
        assert_eq!(keys.verify_refresh(&resp.refresh_token).unwrap().sub, id);

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("refreshToken"));
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("argon2"));
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_before_touching_db() {
        let state = AppState::fake();
        let access = JwtKeys::from_ref(&state).sign_access(Uuid::new_v4()).unwrap();
        let err = refresh(
            State(state),
            Ok(Json(RefreshRequest {
                refresh_token: access,
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_rejects_malformed_email_before_touching_db() {
        let err = login(
            State(AppState::fake()),
            Ok(Json(LoginRequest {
                email: "not-an-email".into(),
                password: "whatever123".into(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid email");
    }
}
