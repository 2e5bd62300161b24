use std::path::Path;

// Applies the migration set against a disposable database. Skipped unless
// QUIZDECK_TEST_DATABASE_URL points at one.
#[tokio::test]
async fn migrations_apply_cleanly() {
    let Ok(database_url) = std::env::var("QUIZDECK_TEST_DATABASE_URL") else {
        eprintln!("QUIZDECK_TEST_DATABASE_URL not set; skipping migration smoke test");
        return;
    };

    let pool = sqlx::PgPool::connect(&database_url).await.expect("connect");

    sqlx::query("DROP SCHEMA IF EXISTS public CASCADE").execute(&pool).await.expect("drop schema");
    sqlx::query("CREATE SCHEMA public").execute(&pool).await.expect("create schema");

    let migrator = sqlx::migrate::Migrator::new(Path::new("migrations")).await.expect("migrator");
    migrator.run(&pool).await.expect("run migrations");

    for table in ["users", "refresh_tokens", "tests", "questions", "attempts"] {
        let exists: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM information_schema.tables
             WHERE table_schema = 'public' AND table_name = $1",
        )
        .bind(table)
        .fetch_optional(&pool)
        .await
        .expect("table lookup");
        assert!(exists.is_some(), "table {table} missing after migration");
    }

    let index: Option<i32> = sqlx::query_scalar(
        "SELECT 1 FROM pg_indexes WHERE indexname = 'ux_attempts_in_progress'",
    )
    .fetch_optional(&pool)
    .await
    .expect("index lookup");
    assert!(index.is_some(), "partial unique index on open attempts missing");
}
