use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    jobs::{EnqueueResult, Job, NewJob},
    mkt_api::errors::MarketplaceError,
};

pub async fn fetch_active_job(key: &str, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM jobs WHERE job_key = $1 AND status IN ('QUEUED', 'RUNNING')")
        .bind(key)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_job(job_id: i64, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(job_id).fetch_optional(conn).await
}

pub async fn fetch_latest_job_by_key(key: &str, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM jobs WHERE job_key = $1 ORDER BY id DESC LIMIT 1")
        .bind(key)
        .fetch_optional(conn)
        .await
}

/// Inserts the job unless an active job with the same key exists. Run inside a write transaction so that the check and
/// the insert cannot interleave with another enqueue.
pub async fn enqueue(
    job: NewJob,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<EnqueueResult, MarketplaceError> {
    let key = job.key();
    if let Some(existing) = fetch_active_job(&key, conn).await? {
        return Ok(EnqueueResult { job_id: existing.id, duplicate: true });
    }
    let payload = serde_json::to_string(&job.kind)?;
    let job_id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO jobs (job_key, kind, payload, run_at, attempts, max_attempts, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, 'QUEUED', $6, $6)
            RETURNING id;
        "#,
    )
    .bind(&key)
    .bind(job.kind.name())
    .bind(payload)
    .bind(job.run_at)
    .bind(job.max_attempts.max(1))
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Job {key} queued as #{job_id}");
    Ok(EnqueueResult { job_id, duplicate: false })
}

/// Claims due jobs (and RUNNING jobs whose lock has lapsed), oldest due first.
pub async fn claim_due(
    now: DateTime<Utc>,
    limit: i64,
    lock_for: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Job>, MarketplaceError> {
    let lock_for = chrono::Duration::from_std(lock_for).map_err(|e| MarketplaceError::InternalError(e.to_string()))?;
    let locked_until = now + lock_for;
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
            SELECT id FROM jobs
            WHERE (status = 'QUEUED' AND run_at <= $1) OR (status = 'RUNNING' AND locked_until <= $1)
            ORDER BY run_at, id
            LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    let mut jobs = Vec::with_capacity(ids.len());
    for id in ids {
        let job: Job = sqlx::query_as(
            r#"
                UPDATE jobs
                SET status = 'RUNNING', attempts = attempts + 1, locked_until = $1, updated_at = $2
                WHERE id = $3
                RETURNING *;
            "#,
        )
        .bind(locked_until)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        jobs.push(job);
    }
    Ok(jobs)
}

pub async fn mark_done(job_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = 'DONE', locked_until = NULL, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn requeue(
    job_id: i64,
    run_at: DateTime<Utc>,
    error: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE jobs
            SET status = 'QUEUED', run_at = $1, last_error = $2, locked_until = NULL, updated_at = $3
            WHERE id = $4
        "#,
    )
    .bind(run_at)
    .bind(error)
    .bind(now)
    .bind(job_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn mark_dead(
    job_id: i64,
    error: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = 'DEAD', last_error = $1, locked_until = NULL, updated_at = $2 WHERE id = $3")
        .bind(error)
        .bind(now)
        .bind(job_id)
        .execute(conn)
        .await?;
    Ok(())
}
