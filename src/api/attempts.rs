use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{AuthUser, StaffUser};
use crate::api::pagination::Page;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Attempt, AttemptAnswer, Question, Test};
use crate::db::types::{ApprovalStatus, AttemptStatus, TestStatus};
use crate::repositories;
use crate::schemas::attempt::{
    AttemptListQuery, AttemptResponse, AttemptStart, AttemptStartResponse, AttemptSubmit,
};
use crate::schemas::question::QuestionPublicResponse;
use crate::schemas::ApiResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(start))
        .route("/:id/submit", post(submit))
}

/// Starts an attempt, or resumes the one already in progress. The partial
/// unique index makes concurrent starts collapse onto a single row.
async fn start(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AttemptStart>,
) -> Result<(StatusCode, Json<ApiResponse<AttemptStartResponse>>), ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;

    let test = repositories::tests::find_by_id(state.db(), &payload.test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    if test.status != TestStatus::Active {
        return Err(ApiError::InvalidState("Test is not active".to_string()));
    }

    let now = primitive_now_utc();
    let inserted = repositories::attempts::insert_in_progress(
        state.db(),
        repositories::attempts::CreateAttempt {
            id: &Uuid::new_v4().to_string(),
            user_id: &user.id,
            test_id: &test.id,
            started_at: now,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to start attempt"))?;

    let (attempt, status) = match inserted {
        Some(attempt) => (attempt, StatusCode::CREATED),
        None => {
            let existing =
                repositories::attempts::find_in_progress(state.db(), &user.id, &test.id)
                    .await
                    .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
                    .ok_or_else(|| {
                        ApiError::internal(
                            "insert conflicted but no open attempt found",
                            "Failed to start attempt",
                        )
                    })?;
            (existing, StatusCode::OK)
        }
    };

    let questions = load_question_sheet(&state, &test.id).await?;

    let body = ApiResponse::ok(AttemptStartResponse {
        attempt: AttemptResponse::from_db(attempt),
        questions,
        duration_minutes: test.duration_minutes,
    });
    Ok((status, Json(body)))
}

async fn submit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AttemptSubmit>,
) -> Result<Json<ApiResponse<AttemptResponse>>, ApiError> {
    payload.validate().map_err(ApiError::from_validation)?;
    if payload.status == AttemptStatus::InProgress {
        return Err(ApiError::Validation("status must be SUBMITTED or TIMED_OUT".to_string()));
    }

    let attempt = repositories::attempts::find_by_id(state.db(), &id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))?;

    if attempt.user_id != user.id {
        return Err(ApiError::Forbidden("Attempt belongs to another user"));
    }
    if attempt.status != AttemptStatus::InProgress {
        return Err(ApiError::InvalidState("Attempt has already been submitted".to_string()));
    }

    let test = repositories::tests::find_by_id(state.db(), &attempt.test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    let answers: Vec<AttemptAnswer> = payload
        .answers
        .into_iter()
        .map(|answer| AttemptAnswer {
            question_id: answer.question_id,
            selected_index: answer.selected_index,
        })
        .collect();

    let answered_ids: Vec<String> =
        answers.iter().map(|answer| answer.question_id.clone()).collect();
    let questions =
        repositories::questions::find_for_test_in(state.db(), &attempt.test_id, &answered_ids)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;

    let (score, matched) = score_answers(&answers, &questions);
    let total = resolve_total(&test, matched);

    let now = primitive_now_utc();
    let final_status = final_status_for(payload.status, &attempt, &test, now);

    let submitted = repositories::attempts::submit(
        state.db(),
        &attempt.id,
        &answers,
        score,
        total,
        final_status,
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to submit attempt"))?
    .ok_or_else(|| ApiError::InvalidState("Attempt has already been submitted".to_string()))?;

    Ok(Json(ApiResponse::ok(AttemptResponse::from_db(submitted))))
}

async fn list(
    State(state): State<AppState>,
    StaffUser(_user): StaffUser,
    Query(query): Query<AttemptListQuery>,
) -> Result<Json<ApiResponse<Vec<AttemptResponse>>>, ApiError> {
    let filter = repositories::attempts::AttemptFilter {
        user_id: query.user_id,
        test_id: query.test_id,
        status: query.status,
    };
    let page = Page::resolve(query.page, query.limit);

    let total = repositories::attempts::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    let attempts = repositories::attempts::list(state.db(), &filter, page.skip(), page.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    let items = attempts.into_iter().map(AttemptResponse::from_db).collect();
    Ok(Json(ApiResponse::page(items, page.meta(total))))
}

async fn load_question_sheet(
    state: &AppState,
    test_id: &str,
) -> Result<Vec<QuestionPublicResponse>, ApiError> {
    let filter = repositories::questions::QuestionFilter {
        test_id: Some(test_id.to_string()),
        approval_status: Some(ApprovalStatus::Approved),
        ..Default::default()
    };
    let count = repositories::questions::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
    let questions = repositories::questions::list(state.db(), &filter, 0, count.max(1))
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;

    Ok(questions.into_iter().map(QuestionPublicResponse::from_db).collect())
}

/// Scores answers against the attempt's own test questions. Unknown or
/// foreign question ids simply never match. Returns the score and how many
/// answers referenced a real question.
fn score_answers(answers: &[AttemptAnswer], questions: &[Question]) -> (i32, i32) {
    let correct_by_id: HashMap<&str, i32> = questions
        .iter()
        .map(|question| (question.id.as_str(), question.correct_index))
        .collect();

    // Last answer wins when a question id repeats.
    let mut selected_by_id: HashMap<&str, i32> = HashMap::new();
    for answer in answers {
        selected_by_id.insert(answer.question_id.as_str(), answer.selected_index);
    }

    let mut score = 0;
    let mut matched = 0;
    for (question_id, selected) in &selected_by_id {
        if let Some(correct) = correct_by_id.get(question_id) {
            matched += 1;
            if selected == correct {
                score += 1;
            }
        }
    }
    (score, matched)
}

fn resolve_total(test: &Test, matched: i32) -> i32 {
    if test.total_questions > 0 {
        test.total_questions
    } else {
        matched
    }
}

/// The client reports how the attempt ended, but a submission arriving past
/// the deadline is recorded as timed out regardless.
fn final_status_for(
    requested: AttemptStatus,
    attempt: &Attempt,
    test: &Test,
    now: time::PrimitiveDateTime,
) -> AttemptStatus {
    let deadline = attempt.started_at + Duration::minutes(test.duration_minutes as i64);
    if now > deadline {
        AttemptStatus::TimedOut
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sqlx::types::Json as SqlxJson;
    use time::{Date, Month, Time};
    use tower::ServiceExt;

    use crate::api::router::router;
    use crate::db::types::DifficultyLevel;
    use crate::test_support;

    fn question(id: &str, correct_index: i32) -> Question {
        let now = primitive_datetime(10, 0);
        Question {
            id: id.to_string(),
            test_id: Some("test-1".to_string()),
            subject: "Math".to_string(),
            text: "?".to_string(),
            options: SqlxJson(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            correct_index,
            difficulty: DifficultyLevel::Easy,
            is_bank: false,
            approval_status: ApprovalStatus::Approved,
            created_by: "teacher-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn answer(question_id: &str, selected_index: i32) -> AttemptAnswer {
        AttemptAnswer { question_id: question_id.to_string(), selected_index }
    }

    fn primitive_datetime(hour: u8, minute: u8) -> time::PrimitiveDateTime {
        let date = Date::from_calendar_date(2026, Month::March, 2).unwrap();
        time::PrimitiveDateTime::new(date, Time::from_hms(hour, minute, 0).unwrap())
    }

    fn test_fixture(total_questions: i32, duration_minutes: i32) -> Test {
        let now = primitive_datetime(9, 0);
        Test {
            id: "test-1".to_string(),
            title: "Quiz".to_string(),
            subject: "Math".to_string(),
            duration_minutes,
            status: TestStatus::Active,
            total_questions,
            created_by: "teacher-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn attempt_fixture(started_at: time::PrimitiveDateTime) -> Attempt {
        Attempt {
            id: "attempt-1".to_string(),
            user_id: "user-1".to_string(),
            test_id: "test-1".to_string(),
            answers: SqlxJson(Vec::new()),
            started_at,
            submitted_at: None,
            score: None,
            total: None,
            status: AttemptStatus::InProgress,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    #[test]
    fn scoring_counts_only_matching_correct_indices() {
        let questions = vec![question("q1", 0), question("q2", 3), question("q3", 1)];
        let answers = vec![answer("q1", 0), answer("q2", 2), answer("q3", 1)];

        let (score, matched) = score_answers(&answers, &questions);
        assert_eq!(score, 2);
        assert_eq!(matched, 3);
    }

    #[test]
    fn foreign_question_ids_score_zero_silently() {
        let questions = vec![question("q1", 0)];
        let answers = vec![answer("q1", 0), answer("other-test-question", 0)];

        let (score, matched) = score_answers(&answers, &questions);
        assert_eq!(score, 1);
        assert_eq!(matched, 1);
    }

    #[test]
    fn duplicate_answers_last_one_wins() {
        let questions = vec![question("q1", 2)];
        let answers = vec![answer("q1", 2), answer("q1", 0)];

        let (score, matched) = score_answers(&answers, &questions);
        assert_eq!(score, 0);
        assert_eq!(matched, 1);
    }

    #[test]
    fn total_prefers_test_counter() {
        assert_eq!(resolve_total(&test_fixture(10, 30), 3), 10);
        assert_eq!(resolve_total(&test_fixture(0, 30), 3), 3);
    }

    #[test]
    fn late_submission_is_marked_timed_out() {
        let test = test_fixture(5, 30);
        let attempt = attempt_fixture(primitive_datetime(10, 0));

        let on_time =
            final_status_for(AttemptStatus::Submitted, &attempt, &test, primitive_datetime(10, 29));
        assert_eq!(on_time, AttemptStatus::Submitted);

        let late =
            final_status_for(AttemptStatus::Submitted, &attempt, &test, primitive_datetime(10, 31));
        assert_eq!(late, AttemptStatus::TimedOut);
    }

    #[test]
    fn client_reported_timeout_is_kept_before_deadline() {
        let test = test_fixture(5, 30);
        let attempt = attempt_fixture(primitive_datetime(10, 0));

        let status =
            final_status_for(AttemptStatus::TimedOut, &attempt, &test, primitive_datetime(10, 5));
        assert_eq!(status, AttemptStatus::TimedOut);
    }

    #[tokio::test]
    async fn submit_rejects_in_progress_status() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let state = test_support::build_state();
        let token = test_support::bearer_token(&state, "user-1", crate::db::types::UserRole::User);

        let app = router(state);
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/attempts/attempt-1/submit")
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"answers": [], "status": "IN_PROGRESS"}"#))
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_requires_authentication() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let app = router(test_support::build_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/attempts")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"testId": "test-1"}"#))
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_is_staff_only() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let state = test_support::build_state();
        let token = test_support::bearer_token(&state, "user-1", crate::db::types::UserRole::User);

        let app = router(state);
        let request = Request::builder()
            .uri("/api/v1/attempts")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
