use serde::Serialize;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::AttemptStatus;

const COLUMNS: &str = "\
    id, user_id, test_id, answers, started_at, submitted_at, score, total, \
    status, created_at, updated_at";

#[derive(Debug, Default)]
pub(crate) struct AttemptFilter {
    pub user_id: Option<String>,
    pub test_id: Option<String>,
    pub status: Option<AttemptStatus>,
}

pub(crate) struct CreateAttempt<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub test_id: &'a str,
    pub started_at: PrimitiveDateTime,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

/// Starts an attempt unless one is already in progress for this user/test
/// pair. The partial unique index on (user_id, test_id) makes the insert
/// atomic; `None` means a concurrent or earlier start already won.
pub(crate) async fn insert_in_progress(
    pool: &PgPool,
    params: CreateAttempt<'_>,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (id, user_id, test_id, answers, started_at, status,
                               created_at, updated_at)
         VALUES ($1, $2, $3, '[]'::jsonb, $4, 'in_progress', $5, $6)
         ON CONFLICT (user_id, test_id) WHERE status = 'in_progress' DO NOTHING
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.test_id)
    .bind(params.started_at)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_in_progress(
    pool: &PgPool,
    user_id: &str,
    test_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE user_id = $1 AND test_id = $2 AND status = 'in_progress'",
    ))
    .bind(user_id)
    .bind(test_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Finalizes an attempt. The status guard makes submission single-winner:
/// `None` means the attempt was already submitted (or does not exist).
pub(crate) async fn submit(
    pool: &PgPool,
    id: &str,
    answers: &[AttemptAnswer],
    score: i32,
    total: i32,
    final_status: AttemptStatus,
    submitted_at: PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET answers = $1, score = $2, total = $3, status = $4,
             submitted_at = $5, updated_at = $5
         WHERE id = $6 AND status = 'in_progress'
         RETURNING {COLUMNS}",
    ))
    .bind(Json(answers))
    .bind(score)
    .bind(total)
    .bind(final_status)
    .bind(submitted_at)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &AttemptFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM attempts WHERE TRUE"));
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY started_at DESC OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);

    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &AttemptFilter) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM attempts WHERE TRUE");
    push_filter(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a AttemptFilter) {
    if let Some(user_id) = &filter.user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if let Some(test_id) = &filter.test_id {
        builder.push(" AND test_id = ");
        builder.push_bind(test_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}

/// Finished attempts for one test joined with the taker, newest first.
#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct AttemptResultRow {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) user_email: String,
    pub(crate) score: Option<i32>,
    pub(crate) total: Option<i32>,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn list_results_for_test(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<AttemptResultRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptResultRow>(
        "SELECT a.id, a.user_id, u.name AS user_name, u.email AS user_email,
                a.score, a.total, a.status, a.started_at, a.submitted_at
         FROM attempts a
         JOIN users u ON u.id = a.user_id
         WHERE a.test_id = $1 AND a.status <> 'in_progress'
         ORDER BY a.submitted_at DESC NULLS LAST",
    )
    .bind(test_id)
    .fetch_all(pool)
    .await
}
