use sqlx::PgExecutor;

use crate::db::models::Attempt;

pub(crate) const COLUMNS: &str = "\
    id, test_id, student_email, started_at, submitted_at, duration_minutes, \
    total_marks, answers, exit_count, blocked, score, status, created_at, updated_at";

pub(crate) async fn insert(
    executor: impl PgExecutor<'_>,
    attempt: &Attempt,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO attempts (
            id, test_id, student_email, started_at, submitted_at, duration_minutes,
            total_marks, answers, exit_count, blocked, score, status, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
    )
    .bind(&attempt.id)
    .bind(&attempt.test_id)
    .bind(&attempt.student_email)
    .bind(attempt.started_at)
    .bind(attempt.submitted_at)
    .bind(attempt.duration_minutes)
    .bind(attempt.total_marks)
    .bind(&attempt.answers)
    .bind(attempt.exit_count)
    .bind(attempt.blocked)
    .bind(attempt.score)
    .bind(attempt.status)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_for_student(
    executor: impl PgExecutor<'_>,
    test_id: &str,
    student_email: &str,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE test_id = $1 AND student_email = $2
         ORDER BY created_at ASC, id ASC"
    ))
    .bind(test_id)
    .bind(student_email)
    .fetch_all(executor)
    .await
}

pub(crate) async fn exists_for_test(
    executor: impl PgExecutor<'_>,
    test_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM attempts WHERE test_id = $1)")
        .bind(test_id)
        .fetch_one(executor)
        .await
}

/// Serializes attempt creation for one student on one test until the
/// surrounding transaction ends.
pub(crate) async fn acquire_student_lock(
    executor: impl PgExecutor<'_>,
    test_id: &str,
    student_email: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("attempt:{test_id}:{student_email}"))
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn save(executor: impl PgExecutor<'_>, attempt: &Attempt) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempts
         SET submitted_at = $1,
             answers = $2,
             exit_count = $3,
             blocked = $4,
             score = $5,
             status = $6,
             updated_at = $7
         WHERE id = $8",
    )
    .bind(attempt.submitted_at)
    .bind(&attempt.answers)
    .bind(attempt.exit_count)
    .bind(attempt.blocked)
    .bind(attempt.score)
    .bind(attempt.status)
    .bind(attempt.updated_at)
    .bind(&attempt.id)
    .execute(executor)
    .await?;
    Ok(())
}
