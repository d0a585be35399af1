use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    jobs::{EnqueueResult, Job, NewJob},
    mkt_api::errors::MarketplaceError,
};

/// A durable, at-least-once job queue.
#[allow(async_fn_in_trait)]
pub trait JobQueue {
    /// Adds a job, unless a QUEUED or RUNNING job with the same key exists, in which case that job is returned with
    /// `duplicate: true`.
    async fn enqueue_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<EnqueueResult, MarketplaceError>;

    /// Claims up to `limit` jobs that are due, plus RUNNING jobs whose lock has lapsed. Claimed jobs are RUNNING,
    /// locked for `lock_for` and have their attempt counter incremented.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lock_for: Duration,
    ) -> Result<Vec<Job>, MarketplaceError>;

    async fn complete_job(&self, job_id: i64, now: DateTime<Utc>) -> Result<(), MarketplaceError>;

    /// Puts the job back in the queue, due at `run_at`.
    async fn retry_job(
        &self,
        job_id: i64,
        run_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MarketplaceError>;

    /// Dead-letters the job.
    async fn bury_job(&self, job_id: i64, error: &str, now: DateTime<Utc>) -> Result<(), MarketplaceError>;

    async fn fetch_job(&self, job_id: i64) -> Result<Option<Job>, MarketplaceError>;

    /// The most recently created job with this key, whatever its status.
    async fn fetch_job_by_key(&self, key: &str) -> Result<Option<Job>, MarketplaceError>;
}
