use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Question;
use crate::db::types::{ApprovalStatus, DifficultyLevel};

const COLUMNS: &str = "\
    id, test_id, subject, text, options, correct_index, difficulty, \
    is_bank, approval_status, created_by, created_at, updated_at";

#[derive(Debug, Default)]
pub(crate) struct QuestionFilter {
    pub subject: Option<String>,
    pub difficulty: Option<DifficultyLevel>,
    pub test_id: Option<String>,
    pub is_bank: Option<bool>,
    pub approval_status: Option<ApprovalStatus>,
}

pub(crate) struct CreateQuestion<'a> {
    pub id: &'a str,
    pub test_id: Option<&'a str>,
    pub subject: &'a str,
    pub text: &'a str,
    pub options: &'a [String],
    pub correct_index: i32,
    pub difficulty: DifficultyLevel,
    pub is_bank: bool,
    pub approval_status: ApprovalStatus,
    pub created_by: &'a str,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (id, test_id, subject, text, options, correct_index, difficulty,
                                is_bank, approval_status, created_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.test_id)
    .bind(params.subject)
    .bind(params.text)
    .bind(Json(params.options))
    .bind(params.correct_index)
    .bind(params.difficulty)
    .bind(params.is_bank)
    .bind(params.approval_status)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &QuestionFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions WHERE TRUE"));
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip);
    builder.push(" LIMIT ");
    builder.push_bind(limit);

    builder.build_query_as::<Question>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &QuestionFilter) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM questions WHERE TRUE");
    push_filter(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a QuestionFilter) {
    if let Some(subject) = &filter.subject {
        builder.push(" AND subject = ");
        builder.push_bind(subject);
    }
    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }
    if let Some(test_id) = &filter.test_id {
        builder.push(" AND test_id = ");
        builder.push_bind(test_id);
    }
    if let Some(is_bank) = filter.is_bank {
        builder.push(" AND is_bank = ");
        builder.push_bind(is_bank);
    }
    if let Some(approval) = filter.approval_status {
        builder.push(" AND approval_status = ");
        builder.push_bind(approval);
    }
}

pub(crate) struct UpdateQuestion {
    pub text: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_index: Option<i32>,
    pub difficulty: Option<DifficultyLevel>,
    pub approval_status: Option<ApprovalStatus>,
    pub updated_at: PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateQuestion,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "UPDATE questions SET
            text = COALESCE($1, text),
            options = COALESCE($2, options),
            correct_index = COALESCE($3, correct_index),
            difficulty = COALESCE($4, difficulty),
            approval_status = COALESCE($5, approval_status),
            updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}",
    ))
    .bind(params.text)
    .bind(params.options.map(Json))
    .bind(params.correct_index)
    .bind(params.difficulty)
    .bind(params.approval_status)
    .bind(params.updated_at)
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "DELETE FROM questions WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Random sample from the approved bank, used when assembling a test.
pub(crate) async fn sample_bank(
    pool: &PgPool,
    subject: &str,
    difficulty: DifficultyLevel,
    limit: i64,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions
         WHERE subject = $1 AND difficulty = $2
           AND is_bank = TRUE AND approval_status = 'approved'
         ORDER BY random()
         LIMIT $3",
    ))
    .bind(subject)
    .bind(difficulty)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Questions of one test restricted to the given ids. Scoring uses this so
/// answers referencing foreign questions never count.
pub(crate) async fn find_for_test_in(
    pool: &PgPool,
    test_id: &str,
    ids: &[String],
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE test_id = $1 AND id = ANY($2)"
    ))
    .bind(test_id)
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// Bulk PENDING to APPROVED transition for questions of one test. Returns
/// how many rows actually moved so the caller can adjust counters.
pub(crate) async fn approve_pending(
    pool: &PgPool,
    test_id: &str,
    ids: &[String],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE questions
         SET approval_status = 'approved', updated_at = $1
         WHERE test_id = $2 AND id = ANY($3) AND approval_status = 'pending'",
    )
    .bind(now)
    .bind(test_id)
    .bind(ids)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
