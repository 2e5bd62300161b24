use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::RefreshToken;

const COLUMNS: &str = "\
    id, user_id, token_hash, jti, expires_at, revoked_at, replaced_by_jti, \
    created_by_ip, created_at";

pub(crate) struct CreateRefreshToken<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub token_hash: &'a str,
    pub jti: &'a str,
    pub expires_at: PrimitiveDateTime,
    pub created_by_ip: Option<&'a str>,
    pub created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateRefreshToken<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, jti, expires_at, created_by_ip, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.token_hash)
    .bind(params.jti)
    .bind(params.expires_at)
    .bind(params.created_by_ip)
    .bind(params.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<RefreshToken>, sqlx::Error> {
    sqlx::query_as::<_, RefreshToken>(&format!(
        "SELECT {COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
    ))
    .bind(token_hash)
    .fetch_optional(pool)
    .await
}

/// Marks the link rotated and records its successor. The `revoked_at IS NULL`
/// guard makes rotation single-winner: a concurrent refresh that lost the
/// race sees zero rows affected.
pub(crate) async fn revoke_and_link(
    pool: &PgPool,
    jti: &str,
    replaced_by_jti: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens
         SET revoked_at = $1, replaced_by_jti = $2
         WHERE jti = $3 AND revoked_at IS NULL",
    )
    .bind(now)
    .bind(replaced_by_jti)
    .bind(jti)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Logout invalidates every session the user holds.
pub(crate) async fn delete_for_user(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
