use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::StaffUser;
use crate::api::pagination::Page;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ApprovalStatus;
use crate::repositories;
use crate::schemas::question::{
    QuestionCreate, QuestionListQuery, QuestionResponse, QuestionUpdate,
};
use crate::schemas::ApiResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(get_one).patch(update).delete(delete_one))
}

async fn create(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<ApiResponse<QuestionResponse>>), ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;

    if let Some(test_id) = &payload.test_id {
        let test = repositories::tests::find_by_id(state.db(), test_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load test"))?;
        if test.is_none() {
            return Err(ApiError::NotFound("Test not found".to_string()));
        }
    }

    let now = primitive_now_utc();
    let question = repositories::questions::create(
        state.db(),
        repositories::questions::CreateQuestion {
            id: &Uuid::new_v4().to_string(),
            test_id: payload.test_id.as_deref(),
            subject: payload.subject.trim(),
            text: payload.text.trim(),
            options: &payload.options,
            correct_index: payload.correct_index,
            difficulty: payload.difficulty,
            is_bank: payload.is_bank,
            approval_status: ApprovalStatus::Approved,
            created_by: &user.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create question"))?;

    // Approved questions attached to a test count toward its size.
    if let Some(test_id) = &question.test_id {
        repositories::tests::increment_total_questions(state.db(), test_id, 1, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update question counter"))?;
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(QuestionResponse::from_db(question)))))
}

async fn list(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Query(query): Query<QuestionListQuery>,
) -> Result<Json<ApiResponse<Vec<QuestionResponse>>>, ApiError> {
    let filter = repositories::questions::QuestionFilter {
        subject: query.subject,
        difficulty: query.difficulty,
        test_id: query.test_id,
        is_bank: query.is_bank,
        approval_status: query.approval_status,
    };
    let page = Page::resolve(query.page, query.limit);

    let total = repositories::questions::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
    let questions = repositories::questions::list(state.db(), &filter, page.skip(), page.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;

    let items = questions.into_iter().map(QuestionResponse::from_db).collect();
    Ok(Json(ApiResponse::page(items, page.meta(total))))
}

async fn get_one(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<QuestionResponse>>, ApiError> {
    let question = repositories::questions::find_by_id(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    Ok(Json(ApiResponse::ok(QuestionResponse::from_db(question))))
}

async fn update(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<String>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<ApiResponse<QuestionResponse>>, ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;

    let question = repositories::questions::update(
        state.db(),
        &id,
        repositories::questions::UpdateQuestion {
            text: payload.text.map(|value| value.trim().to_string()),
            options: payload.options,
            correct_index: payload.correct_index,
            difficulty: payload.difficulty,
            approval_status: payload.approval_status,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update question"))?
    .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    Ok(Json(ApiResponse::ok(QuestionResponse::from_db(question))))
}

async fn delete_one(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let now = primitive_now_utc();
    let question = repositories::questions::delete_by_id(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    if let (Some(test_id), ApprovalStatus::Approved) = (&question.test_id, question.approval_status)
    {
        repositories::tests::increment_total_questions(state.db(), test_id, -1, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update question counter"))?;
    }

    Ok(Json(ApiResponse::message_only("Question deleted successfully")))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::api::router::router;
    use crate::test_support;

    #[tokio::test]
    async fn list_requires_staff_token() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let state = test_support::build_state();
        let token = test_support::bearer_token(&state, "user-1", crate::db::types::UserRole::User);

        let app = router(state);
        let request = Request::builder()
            .uri("/api/v1/questions")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_rejects_three_options() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let state = test_support::build_state();
        let token =
            test_support::bearer_token(&state, "teacher-1", crate::db::types::UserRole::Teacher);

        let app = router(state);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/questions")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(
                r#"{"subject": "Math", "text": "2+2?", "options": ["1", "2", "3"], "correctIndex": 1}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
