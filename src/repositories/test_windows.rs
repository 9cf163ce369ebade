use sqlx::{PgExecutor, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::db::models::Test;
use crate::db::types::TestStatus;

use super::TestFilter;

pub(crate) const COLUMNS: &str = "\
    id, title, start_at, duration_minutes, end_at, end_overridden, pass_marks, \
    total_marks, questions, audience, faculty_id, status, status_changed_at, \
    status_notified_at, created_at, updated_at";

pub(crate) async fn insert(executor: impl PgExecutor<'_>, test: &Test) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tests (
            id, title, start_at, duration_minutes, end_at, end_overridden, pass_marks,
            total_marks, questions, audience, faculty_id, status, status_changed_at,
            status_notified_at, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
    )
    .bind(&test.id)
    .bind(&test.title)
    .bind(test.start_at)
    .bind(test.duration_minutes)
    .bind(test.end_at)
    .bind(test.end_overridden)
    .bind(test.pass_marks)
    .bind(test.total_marks)
    .bind(&test.questions)
    .bind(&test.audience)
    .bind(&test.faculty_id)
    .bind(test.status)
    .bind(test.status_changed_at)
    .bind(test.status_notified_at)
    .bind(test.created_at)
    .bind(test.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!("SELECT {COLUMNS} FROM tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn lock_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!("SELECT {COLUMNS} FROM tests WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list(
    executor: impl PgExecutor<'_>,
    filter: &TestFilter,
) -> Result<Vec<Test>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM tests"));

    if !filter.is_empty() {
        builder.push(" WHERE FALSE");
        if !filter.audience.is_empty() {
            builder.push(
                " OR EXISTS (SELECT 1 FROM unnest(string_to_array(audience, ',')) AS tag \
                 WHERE btrim(tag) = ANY(",
            );
            builder.push_bind(filter.audience.clone());
            builder.push("))");
        }
        if let Some(faculty_id) = &filter.faculty_id {
            builder.push(" OR faculty_id = ");
            builder.push_bind(faculty_id.clone());
        }
    }

    builder.push(" ORDER BY start_at ASC, id ASC");
    builder.build_query_as::<Test>().fetch_all(executor).await
}

pub(crate) async fn save(executor: impl PgExecutor<'_>, test: &Test) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE tests
         SET title = $1,
             start_at = $2,
             duration_minutes = $3,
             end_at = $4,
             end_overridden = $5,
             pass_marks = $6,
             total_marks = $7,
             questions = $8,
             audience = $9,
             status = $10,
             status_changed_at = $11,
             status_notified_at = $12,
             updated_at = $13
         WHERE id = $14",
    )
    .bind(&test.title)
    .bind(test.start_at)
    .bind(test.duration_minutes)
    .bind(test.end_at)
    .bind(test.end_overridden)
    .bind(test.pass_marks)
    .bind(test.total_marks)
    .bind(&test.questions)
    .bind(&test.audience)
    .bind(test.status)
    .bind(test.status_changed_at)
    .bind(test.status_notified_at)
    .bind(test.updated_at)
    .bind(&test.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(executor: impl PgExecutor<'_>, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM tests WHERE id = $1").bind(id).execute(executor).await?;
    Ok(())
}

pub(crate) async fn mark_started(
    executor: impl PgExecutor<'_>,
    now: OffsetDateTime,
) -> Result<Vec<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "UPDATE tests
         SET status = $1, status_changed_at = $3, updated_at = $3
         WHERE status = $2 AND start_at <= $3 AND end_at > $3
         RETURNING {COLUMNS}"
    ))
    .bind(TestStatus::Ongoing)
    .bind(TestStatus::Upcoming)
    .bind(now)
    .fetch_all(executor)
    .await
}

pub(crate) async fn mark_completed(
    executor: impl PgExecutor<'_>,
    now: OffsetDateTime,
) -> Result<Vec<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "UPDATE tests
         SET status = $1, status_changed_at = $2, updated_at = $2
         WHERE status <> $1 AND end_at <= $2
         RETURNING {COLUMNS}"
    ))
    .bind(TestStatus::Completed)
    .bind(now)
    .fetch_all(executor)
    .await
}

pub(crate) async fn claim_unannounced(
    executor: impl PgExecutor<'_>,
    now: OffsetDateTime,
    cutoff: OffsetDateTime,
) -> Result<Vec<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "UPDATE tests
         SET status_notified_at = $1
         WHERE status_changed_at >= $2
           AND (status_notified_at IS NULL OR status_notified_at < status_changed_at)
         RETURNING {COLUMNS}"
    ))
    .bind(now)
    .bind(cutoff)
    .fetch_all(executor)
    .await
}
