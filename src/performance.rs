use chrono::{DateTime, Datelike, Utc};
use sqlx::sqlite::Sqlite;
use uuid::Uuid;

use crate::config::ScoringConfig;

/// Monthly scoring buckets, one row per (user, month, year). All writes go
/// through upserts keyed on that unique triple, so concurrent increments
/// degrade to the update arm instead of duplicating rows. `total_score` is
/// recomputed inside every statement as task_points + late_login_penalty,
/// never accumulated on its own.

pub async fn record_task_completion<'e, E>(
    exec: E,
    scoring: &ScoringConfig,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let points = scoring.task_completion_points;
    sqlx::query(
        r#"
        INSERT INTO performance
            (id, user_id, month, year, tasks_completed, task_points,
             late_logins, late_login_penalty, approved_leaves, total_score, updated_at)
        VALUES (?, ?, ?, ?, 1, ?, 0, 0, 0, ?, ?)
        ON CONFLICT(user_id, month, year) DO UPDATE SET
            tasks_completed = tasks_completed + 1,
            task_points = task_points + excluded.task_points,
            total_score = task_points + excluded.task_points + late_login_penalty,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(at.month() as i64)
    .bind(at.year() as i64)
    .bind(points)
    .bind(points)
    .bind(at)
    .execute(exec)
    .await?;

    Ok(())
}

/// Bucketed by the login timestamp itself, so a late login just before
/// midnight on the 31st lands in that month, not the processing month.
pub async fn record_late_login<'e, E>(
    exec: E,
    scoring: &ScoringConfig,
    user_id: Uuid,
    login_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let penalty = scoring.late_login_penalty;
    sqlx::query(
        r#"
        INSERT INTO performance
            (id, user_id, month, year, tasks_completed, task_points,
             late_logins, late_login_penalty, approved_leaves, total_score, updated_at)
        VALUES (?, ?, ?, ?, 0, 0, 1, ?, 0, ?, ?)
        ON CONFLICT(user_id, month, year) DO UPDATE SET
            late_logins = late_logins + 1,
            late_login_penalty = late_login_penalty + excluded.late_login_penalty,
            total_score = task_points + late_login_penalty + excluded.late_login_penalty,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(login_at.month() as i64)
    .bind(login_at.year() as i64)
    .bind(penalty)
    .bind(penalty)
    .bind(login_at)
    .execute(exec)
    .await?;

    Ok(())
}

/// Approved leaves are counted but carry no score weight.
pub async fn record_approved_leave<'e, E>(
    exec: E,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO performance
            (id, user_id, month, year, tasks_completed, task_points,
             late_logins, late_login_penalty, approved_leaves, total_score, updated_at)
        VALUES (?, ?, ?, ?, 0, 0, 0, 0, 1, 0, ?)
        ON CONFLICT(user_id, month, year) DO UPDATE SET
            approved_leaves = approved_leaves + 1,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(at.month() as i64)
    .bind(at.year() as i64)
    .bind(at)
    .execute(exec)
    .await?;

    Ok(())
}

/// Rebuild one bucket from source-of-truth rows: completed tasks, late
/// attendance days and approved leave requests within the month.
pub async fn recompute_bucket(
    pool: &sqlx::SqlitePool,
    scoring: &ScoringConfig,
    user_id: Uuid,
    month: u32,
    year: i32,
) -> Result<(), sqlx::Error> {
    let tasks_completed: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM tasks
        WHERE assigned_to = ? AND status = 'completed'
          AND CAST(strftime('%m', completed_at) AS INTEGER) = ?
          AND CAST(strftime('%Y', completed_at) AS INTEGER) = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(month as i64)
    .bind(year as i64)
    .fetch_one(pool)
    .await?;

    let late_logins: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM attendance
        WHERE user_id = ? AND late = 1
          AND CAST(strftime('%m', date) AS INTEGER) = ?
          AND CAST(strftime('%Y', date) AS INTEGER) = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(month as i64)
    .bind(year as i64)
    .fetch_one(pool)
    .await?;

    let approved_leaves: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM requests
        WHERE user_id = ? AND request_type = 'leave' AND status = 'approved'
          AND CAST(strftime('%m', approved_at) AS INTEGER) = ?
          AND CAST(strftime('%Y', approved_at) AS INTEGER) = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(month as i64)
    .bind(year as i64)
    .fetch_one(pool)
    .await?;

    let task_points = tasks_completed * scoring.task_completion_points;
    let late_penalty = late_logins * scoring.late_login_penalty;
    let total_score = task_points + late_penalty;

    sqlx::query(
        r#"
        INSERT INTO performance
            (id, user_id, month, year, tasks_completed, task_points,
             late_logins, late_login_penalty, approved_leaves, total_score, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, month, year) DO UPDATE SET
            tasks_completed = excluded.tasks_completed,
            task_points = excluded.task_points,
            late_logins = excluded.late_logins,
            late_login_penalty = excluded.late_login_penalty,
            approved_leaves = excluded.approved_leaves,
            total_score = excluded.total_score,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(month as i64)
    .bind(year as i64)
    .bind(tasks_completed)
    .bind(task_points)
    .bind(late_logins)
    .bind(late_penalty)
    .bind(approved_leaves)
    .bind(total_score)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
