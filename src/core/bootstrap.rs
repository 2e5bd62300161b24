use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;

/// Seeds (or repairs) the administrator account configured via
/// ADMIN_EMAIL/ADMIN_PASSWORD. Skipped when no password is configured.
pub(crate) async fn ensure_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.admin_password.is_empty() {
        tracing::warn!("ADMIN_PASSWORD not configured; skipping admin seed");
        return Ok(());
    }

    let email = admin.admin_email.to_lowercase();
    let user = repositories::users::find_by_email(state.db(), &email).await?;
    let now = primitive_now_utc();

    if let Some(user) = user {
        let verified = security::verify_password(&admin.admin_password, &user.hashed_password)
            .unwrap_or(false);
        let role_ok = user.role == UserRole::Admin;

        if verified && role_ok && user.is_active {
            tracing::info!("Seed admin already up to date");
            return Ok(());
        }

        let hashed_password = if verified {
            user.hashed_password.clone()
        } else {
            security::hash_password(&admin.admin_password)?
        };

        sqlx::query(
            "UPDATE users
             SET hashed_password = $1, role = $2, is_active = TRUE, updated_at = $3
             WHERE id = $4",
        )
        .bind(hashed_password)
        .bind(UserRole::Admin)
        .bind(now)
        .bind(&user.id)
        .execute(state.db())
        .await?;

        tracing::info!(email = %email, "Updated seed admin");
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.admin_password)?;

    sqlx::query(
        "INSERT INTO users (id, name, email, hashed_password, role, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind("Admin")
    .bind(&email)
    .bind(hashed_password)
    .bind(UserRole::Admin)
    .bind(now)
    .bind(now)
    .execute(state.db())
    .await?;

    tracing::info!(email = %email, "Created seed admin");
    Ok(())
}
