use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::cookies::{self, REFRESH_COOKIE};
use crate::api::errors::ApiError;
use crate::api::guards::client_ip;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::services::oauth::{OAuthError, OAuthProvider, ProviderProfile};

/// Consent round trips should finish well within this window.
const STATE_COOKIE_MAX_AGE_SECONDS: i64 = 600;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:provider", get(start))
        .route("/:provider/callback", get(callback))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn state_cookie_name(provider: OAuthProvider) -> String {
    format!("oauth_state_{}", provider.as_str())
}

fn parse_provider(raw: &str) -> Result<OAuthProvider, ApiError> {
    OAuthProvider::from_path(raw)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown oauth provider: {raw}")))
}

async fn start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let provider = parse_provider(&provider)?;

    let anti_forgery = Uuid::new_v4().to_string();
    let url = state.oauth().authorize_url(provider, &anti_forgery).map_err(map_oauth_error)?;

    let secure = state.settings().runtime().environment.is_production();
    let cookie = cookies::build_cookie(
        &state_cookie_name(provider),
        &anti_forgery,
        STATE_COOKIE_MAX_AGE_SECONDS,
        secure,
    );

    let mut response = redirect(&url)?;
    append_set_cookie(&mut response, cookie)?;
    Ok(response)
}

async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let provider = parse_provider(&provider)?;
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let secure = state.settings().runtime().environment.is_production();

    if let Some(error) = query.error {
        tracing::warn!(provider = provider.as_str(), error = %error, "OAuth consent denied");
        return redirect(&failure_url(&state, "consent_denied"));
    }

    let code = query.code.ok_or(ApiError::Validation("Missing oauth code".to_string()))?;
    let returned_state =
        query.state.ok_or(ApiError::Validation("Missing oauth state".to_string()))?;

    let expected_state = cookies::cookie_value(&headers, &state_cookie_name(provider))
        .ok_or(ApiError::Unauthorized("Missing oauth state cookie"))?;
    if expected_state != returned_state {
        return Err(ApiError::Unauthorized("OAuth state mismatch"));
    }

    let profile = state.oauth().exchange_code(provider, &code).await.map_err(map_oauth_error)?;
    let user = provision_user(&state, profile).await?;

    if !user.is_active {
        return redirect(&failure_url(&state, "account_deactivated"));
    }

    let access_token = security::create_access_token(&user.id, user.role, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;
    let issued = security::create_refresh_token(&user.id, user.role, state.settings())
        .map_err(|e| ApiError::internal(e, "Failed to create refresh token"))?;

    repositories::refresh_tokens::create(
        state.db(),
        repositories::refresh_tokens::CreateRefreshToken {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            token_hash: &issued.token_hash,
            jti: &issued.jti,
            expires_at: to_primitive_utc(issued.expires_at),
            created_by_ip: ip.as_deref(),
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to persist refresh token"))?;

    let max_age = state.settings().security().refresh_token_expire_days as i64 * 24 * 3600;
    let refresh_cookie = cookies::build_cookie(REFRESH_COOKIE, &issued.token, max_age, secure);
    let clear_state = cookies::clear_cookie(&state_cookie_name(provider), secure);

    let target = format!(
        "{}/oauth-callback?accessToken={}",
        state.settings().oauth().frontend_url.trim_end_matches('/'),
        access_token
    );

    let mut response = redirect(&target)?;
    append_set_cookie(&mut response, refresh_cookie)?;
    append_set_cookie(&mut response, clear_state)?;
    Ok(response)
}

/// Looks up the account behind the provider email and creates one on first
/// login. OAuth accounts get an unguessable local password.
async fn provision_user(state: &AppState, profile: ProviderProfile) -> Result<User, ApiError> {
    let existing = repositories::users::find_by_email(state.db(), &profile.email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?;
    if let Some(user) = existing {
        return Ok(user);
    }

    let hashed_password = security::hash_password(&Uuid::new_v4().to_string())
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let now = primitive_now_utc();
    repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            name: profile.name.trim(),
            email: &profile.email,
            hashed_password,
            role: UserRole::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create user"))
}

fn failure_url(state: &AppState, reason: &str) -> String {
    format!(
        "{}/oauth-callback?error={}",
        state.settings().oauth().frontend_url.trim_end_matches('/'),
        reason
    )
}

fn map_oauth_error(err: OAuthError) -> ApiError {
    match err {
        OAuthError::NotConfigured(provider) => {
            ApiError::UpstreamUnavailable(format!("oauth provider {provider} is not configured"))
        }
        OAuthError::Exchange(message) => ApiError::UpstreamDataError(message),
        OAuthError::MissingEmail => {
            ApiError::UpstreamDataError("oauth provider returned no email".to_string())
        }
    }
}

fn redirect(target: &str) -> Result<Response, ApiError> {
    let location = header::HeaderValue::from_str(target)
        .map_err(|e| ApiError::internal(e, "Failed to build redirect"))?;
    let mut response = StatusCode::TEMPORARY_REDIRECT.into_response();
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

fn append_set_cookie(response: &mut Response, cookie: String) -> Result<(), ApiError> {
    let value = header::HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal(e, "Failed to build cookie"))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}
