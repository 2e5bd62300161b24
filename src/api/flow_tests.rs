//! End-to-end flows against a real database. These tests run only when
//! `QUIZDECK_TEST_DATABASE_URL` points at a disposable Postgres instance and
//! skip silently otherwise.

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use crate::api::router::router;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::core::{config::Settings, redis::RedisHandle, security};
use crate::db::models::{Question, Test, User};
use crate::db::types::{ApprovalStatus, AttemptStatus, DifficultyLevel, TestStatus, UserRole};
use crate::repositories;
use crate::services::ai_questions::AiQuestionService;
use crate::services::oauth::OAuthService;
use crate::test_support;

async fn db_state() -> Option<AppState> {
    let url = match std::env::var("QUIZDECK_TEST_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("QUIZDECK_TEST_DATABASE_URL is not set; skipping database-backed test");
            return None;
        }
    };

    test_support::set_test_env();
    std::env::set_var("DATABASE_URL", &url);

    let settings = Settings::load().expect("settings");
    let pool = PgPool::connect(&url).await.expect("database connection");
    crate::db::run_migrations(&pool).await.expect("migrations");

    let redis = RedisHandle::new(settings.redis().redis_url());
    let ai = AiQuestionService::from_settings(&settings).expect("ai service");
    let oauth = OAuthService::from_settings(&settings).expect("oauth service");
    Some(AppState::new(settings, pool, redis, ai, oauth))
}

async fn seed_user(state: &AppState, password: &str) -> User {
    let now = primitive_now_utc();
    let email = format!("{}@example.com", Uuid::new_v4());
    let hashed_password = security::hash_password(password).expect("hash");
    repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            name: "Flow Tester",
            email: &email,
            hashed_password,
            role: UserRole::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .expect("seed user")
}

async fn seed_test(state: &AppState, owner_id: &str) -> Test {
    let now = primitive_now_utc();
    repositories::tests::create(
        state.db(),
        repositories::tests::CreateTest {
            id: &Uuid::new_v4().to_string(),
            title: "Flow quiz",
            subject: "Math",
            duration_minutes: 30,
            status: TestStatus::Active,
            created_by: owner_id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .expect("seed test")
}

async fn seed_question(
    state: &AppState,
    test_id: &str,
    creator_id: &str,
    correct_index: i32,
) -> Question {
    let now = primitive_now_utc();
    let options: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
    repositories::questions::create(
        state.db(),
        repositories::questions::CreateQuestion {
            id: &Uuid::new_v4().to_string(),
            test_id: Some(test_id),
            subject: "Math",
            text: "Pick one",
            options: &options,
            correct_index,
            difficulty: DifficultyLevel::Easy,
            is_bank: false,
            approval_status: ApprovalStatus::Approved,
            created_by: creator_id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .expect("seed question")
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn refresh_cookie(response: &Response<Body>) -> String {
    let header = response
        .headers()
        .get("set-cookie")
        .expect("set-cookie header")
        .to_str()
        .expect("cookie value");
    assert!(header.starts_with("refreshToken="));
    header.split(';').next().expect("cookie pair").to_string()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn restarting_an_attempt_returns_the_same_row() {
    let _guard = test_support::env_lock();
    let Some(state) = db_state().await else { return };

    let user = seed_user(&state, "flow-pass-123").await;
    let test = seed_test(&state, &user.id).await;
    let token = test_support::bearer_token(&state, &user.id, UserRole::User);

    let app = router(state);
    let body = json!({"testId": test.id});

    let first = app
        .clone()
        .oneshot(post_json("/api/v1/attempts", &token, body.clone()))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_id = json_body(first).await["data"]["attempt"]["id"].as_str().unwrap().to_string();

    let second = app
        .oneshot(post_json("/api/v1/attempts", &token, body))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    let second_id = json_body(second).await["data"]["attempt"]["id"].as_str().unwrap().to_string();

    assert_eq!(first_id, second_id);
}

#[tokio::test]
async fn second_submission_is_rejected_and_score_is_unchanged() {
    let _guard = test_support::env_lock();
    let Some(state) = db_state().await else { return };

    let user = seed_user(&state, "flow-pass-123").await;
    let test = seed_test(&state, &user.id).await;
    let right = seed_question(&state, &test.id, &user.id, 1).await;
    let wrong = seed_question(&state, &test.id, &user.id, 2).await;
    let token = test_support::bearer_token(&state, &user.id, UserRole::User);

    let app = router(state.clone());
    let start = app
        .clone()
        .oneshot(post_json("/api/v1/attempts", &token, json!({"testId": test.id})))
        .await
        .expect("response");
    assert_eq!(start.status(), StatusCode::CREATED);
    let attempt_id =
        json_body(start).await["data"]["attempt"]["id"].as_str().unwrap().to_string();

    let answers = json!({
        "answers": [
            {"questionId": right.id, "selectedIndex": 1},
            {"questionId": wrong.id, "selectedIndex": 0}
        ],
        "status": "SUBMITTED"
    });
    let submit_uri = format!("/api/v1/attempts/{attempt_id}/submit");

    let submitted = app
        .clone()
        .oneshot(post_json(&submit_uri, &token, answers.clone()))
        .await
        .expect("response");
    assert_eq!(submitted.status(), StatusCode::OK);
    let body = json_body(submitted).await;
    assert_eq!(body["data"]["score"], 1);
    assert_eq!(body["data"]["status"], "SUBMITTED");

    let again = app.oneshot(post_json(&submit_uri, &token, answers)).await.expect("response");
    assert_eq!(again.status(), StatusCode::BAD_REQUEST);

    let stored = repositories::attempts::find_by_id(state.db(), &attempt_id)
        .await
        .expect("load attempt")
        .expect("attempt exists");
    assert_eq!(stored.score, Some(1));
    assert_eq!(stored.status, AttemptStatus::Submitted);
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let _guard = test_support::env_lock();
    let Some(state) = db_state().await else { return };

    let password = "flow-pass-123";
    let user = seed_user(&state, password).await;

    let app = router(state);
    let login = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"email": user.email, "password": password}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(login.status(), StatusCode::OK);
    let cookie = refresh_cookie(&login);

    let refresh_request = |cookie: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/auth/refresh")
            .header("cookie", cookie.to_string())
            .body(Body::empty())
            .unwrap()
    };

    let rotated = app.clone().oneshot(refresh_request(&cookie)).await.expect("response");
    assert_eq!(rotated.status(), StatusCode::OK);

    let replayed = app.oneshot(refresh_request(&cookie)).await.expect("response");
    assert_eq!(replayed.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_never_grants_a_staff_role() {
    let _guard = test_support::env_lock();
    let Some(state) = db_state().await else { return };

    let email = format!("{}@example.com", Uuid::new_v4());
    let password = "flow-pass-123";

    let app = router(state.clone());
    let registered = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "Aspiring Staff",
                        "email": email,
                        "password": password,
                        "role": "TEACHER"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(registered.status(), StatusCode::CREATED);
    assert_eq!(json_body(registered).await["data"]["role"], "USER");

    let login = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"email": email, "password": password}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(login.status(), StatusCode::OK);

    let access_token =
        json_body(login).await["data"]["accessToken"].as_str().unwrap().to_string();
    let claims =
        security::verify_access_token(&access_token, state.settings()).expect("valid token");
    assert_eq!(claims.role, UserRole::User);
}
