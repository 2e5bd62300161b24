use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::errors::ApiError;
use crate::api::guards::StaffUser;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::schemas::ApiResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/tests/:id/results", get(test_results))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TestResultRow {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) user_email: String,
    pub(crate) score: Option<i32>,
    pub(crate) total: Option<i32>,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) submitted_at: Option<String>,
}

/// Finished attempts for one test with the taker's identity, newest first.
async fn test_results(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TestResultRow>>>, ApiError> {
    let test = repositories::tests::find_by_id(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test"))?;
    if test.is_none() {
        return Err(ApiError::NotFound("Test not found".to_string()));
    }

    let rows = repositories::attempts::list_results_for_test(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test results"))?;

    let items = rows
        .into_iter()
        .map(|row| TestResultRow {
            attempt_id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            user_email: row.user_email,
            score: row.score,
            total: row.total,
            status: row.status,
            started_at: format_primitive(row.started_at),
            submitted_at: row.submitted_at.map(format_primitive),
        })
        .collect();

    Ok(Json(ApiResponse::ok(items)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::router::router;
    use crate::test_support;

    #[tokio::test]
    async fn results_are_staff_only() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let state = test_support::build_state();
        let token = test_support::bearer_token(&state, "user-1", crate::db::types::UserRole::User);

        let app = router(state);
        let request = Request::builder()
            .uri("/api/v1/analytics/tests/test-1/results")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
