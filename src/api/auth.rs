use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::cookies::{self, REFRESH_COOKIE};
use crate::api::errors::ApiError;
use crate::api::guards::{client_ip, AuthUser};
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::auth::{AuthResponse, RefreshRequest, TokenPair};
use crate::schemas::user::{UserLogin, UserRegister, UserResponse};
use crate::schemas::ApiResponse;

/// Max attempts per window for auth endpoints.
const AUTH_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
const AUTH_RATE_WINDOW_SECONDS: u64 = 60;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserRegister>,
) -> Result<Response, ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;

    let email = payload.email.trim().to_lowercase();

    let rate_key = format!("rl:register:{email}");
    let allowed = state
        .redis()
        .rate_limit(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many registration attempts, try again later"));
    }

    let existing = repositories::users::exists_by_email(state.db(), &email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User with this email already exists".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let now = primitive_now_utc();
    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            name: payload.name.trim(),
            email: &email,
            hashed_password,
            // Self-registration never grants staff roles.
            role: UserRole::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create user"))?;

    let body =
        ApiResponse::with_message("User registered successfully", UserResponse::from_db(user));
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<UserLogin>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    payload.validate().map_err(ApiError::from_validation)?;

    let email = payload.email.trim().to_lowercase();

    let rate_key = format!("rl:login:{email}");
    let allowed = state
        .redis()
        .rate_limit(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many login attempts, try again later"));
    }

    let user = repositories::users::find_by_email(state.db(), &email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("Incorrect email or password"))?;

    let verified = security::verify_password(&payload.password, &user.hashed_password)
        .map_err(|_| ApiError::Unauthorized("Incorrect email or password"))?;
    if !verified {
        return Err(ApiError::Unauthorized("Incorrect email or password"));
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated"));
    }

    issue_session(&state, user, ip.as_deref(), StatusCode::OK).await
}

async fn refresh(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let raw_token = cookies::cookie_value(&headers, REFRESH_COOKIE)
        .or_else(|| payload.and_then(|Json(body)| body.refresh_token))
        .ok_or(ApiError::Unauthorized("Refresh token is missing"))?;

    let claims = security::verify_refresh_token(&raw_token, state.settings())
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token"))?;

    let rate_key = format!("rl:refresh:{}", claims.sub);
    let allowed = state
        .redis()
        .rate_limit(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many refresh attempts, try again later"));
    }

    let token_hash = security::hash_refresh_token(&raw_token);
    let record = repositories::refresh_tokens::find_by_hash(state.db(), &token_hash)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load refresh token"))?
        .ok_or(ApiError::Unauthorized("Invalid refresh token"))?;

    if record.jti != claims.jti {
        return Err(ApiError::Unauthorized("Invalid refresh token"));
    }

    let now = primitive_now_utc();
    if record.revoked_at.is_some() || record.expires_at <= now {
        return Err(ApiError::Unauthorized("Refresh token is no longer valid"));
    }

    let user = repositories::users::find_by_id(state.db(), &record.user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("Invalid refresh token"))?;
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated"));
    }

    let issued = security::create_refresh_token(&user.id, user.role, state.settings())
        .map_err(|e| ApiError::internal(e, "Failed to create refresh token"))?;

    // Single-winner rotation: losing a concurrent race means the old link
    // was already rotated, which we treat as token reuse.
    let rotated =
        repositories::refresh_tokens::revoke_and_link(state.db(), &claims.jti, &issued.jti, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to rotate refresh token"))?;
    if rotated == 0 {
        return Err(ApiError::Unauthorized("Refresh token is no longer valid"));
    }

    persist_refresh_token(&state, &user.id, &issued, ip.as_deref()).await?;

    let access_token = security::create_access_token(&user.id, user.role, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    session_response(&state, user, access_token, issued.token, StatusCode::OK)
}

async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    repositories::refresh_tokens::delete_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete refresh tokens"))?;

    let secure = state.settings().runtime().environment.is_production();
    let mut response =
        Json(ApiResponse::message_only("Logged out successfully")).into_response();
    append_set_cookie(&mut response, cookies::clear_cookie(REFRESH_COOKIE, secure))?;
    Ok(response)
}

async fn issue_session(
    state: &AppState,
    user: User,
    ip: Option<&str>,
    status: StatusCode,
) -> Result<Response, ApiError> {
    let access_token = security::create_access_token(&user.id, user.role, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;
    let issued = security::create_refresh_token(&user.id, user.role, state.settings())
        .map_err(|e| ApiError::internal(e, "Failed to create refresh token"))?;

    persist_refresh_token(state, &user.id, &issued, ip).await?;

    session_response(state, user, access_token, issued.token, status)
}

async fn persist_refresh_token(
    state: &AppState,
    user_id: &str,
    issued: &security::IssuedRefreshToken,
    ip: Option<&str>,
) -> Result<(), ApiError> {
    repositories::refresh_tokens::create(
        state.db(),
        repositories::refresh_tokens::CreateRefreshToken {
            id: &Uuid::new_v4().to_string(),
            user_id,
            token_hash: &issued.token_hash,
            jti: &issued.jti,
            expires_at: to_primitive_utc(issued.expires_at),
            created_by_ip: ip,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to persist refresh token"))
}

fn session_response(
    state: &AppState,
    user: User,
    access_token: String,
    refresh_token: String,
    status: StatusCode,
) -> Result<Response, ApiError> {
    let secure = state.settings().runtime().environment.is_production();
    let max_age = state.settings().security().refresh_token_expire_days as i64 * 24 * 3600;
    let cookie = cookies::build_cookie(REFRESH_COOKIE, &refresh_token, max_age, secure);

    let body = ApiResponse::ok(AuthResponse {
        user: UserResponse::from_db(user),
        tokens: TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        },
    });

    let mut response = (status, Json(body)).into_response();
    append_set_cookie(&mut response, cookie)?;
    Ok(response)
}

fn append_set_cookie(response: &mut Response, cookie: String) -> Result<(), ApiError> {
    let value = header::HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal(e, "Failed to build session cookie"))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::router::router;
    use crate::test_support;

    #[tokio::test]
    async fn refresh_without_token_returns_401() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let app = router(test_support::build_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_with_garbage_token_returns_401() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let app = router(test_support::build_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .header("cookie", "refreshToken=not-a-jwt")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_invalid_payload() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let app = router(test_support::build_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/register")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"name": "A", "email": "not-an-email", "password": "x"}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_requires_bearer_token() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let app = router(test_support::build_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/auth/logout")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
