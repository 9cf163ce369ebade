use sqlx::Row;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();

    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn migrations_apply_and_tables_exist() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping migration smoke test");
        return Ok(());
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url).await?;

    let migrations_dir =
        std::env::var("PROCTOR_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;

    for table in ["tests", "attempts"] {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO tests (id, title, start_at, duration_minutes, end_at, total_marks, faculty_id)
         VALUES ('smoke-test', 'Smoke', now(), 30, now() + interval '30 minutes', 10, 'faculty')",
    )
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO attempts (id, test_id, student_email, started_at, duration_minutes, total_marks)
         VALUES ('smoke-attempt', 'smoke-test', 'smoke@example.test', now(), 30, 10)",
    )
    .execute(&mut *tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM tests WHERE id = 'smoke-test'").execute(&mut *tx).await;
    assert!(deleted.is_err(), "a test with attempts must not be deletable");
    tx.rollback().await?;

    Ok(())
}
