use axum::{extract::State, routing::get, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::AuthUser;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::user::UserResponse;
use crate::schemas::ApiResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let record = repositories::users::find_by_id(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::ok(UserResponse::from_db(record))))
}
