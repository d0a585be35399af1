use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    config::MarketplaceConfig,
    jobs::{Job, JobKind},
    mkt_api::{
        errors::MarketplaceError,
        order_flow_api::OrderFlowApi,
        payout_api::{PayoutApi, PayoutPeriod},
    },
    traits::MarketplaceDatabase,
};

/// What a single pass of [`JobRunner::run_due_jobs`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub buried: usize,
}

/// Claims due jobs and executes them.
///
/// A job that fails with a transient error is retried with exponential backoff until its attempts run out; any other
/// failure, or running out of attempts, dead-letters it.
pub struct JobRunner<B> {
    db: B,
    config: MarketplaceConfig,
    orders: OrderFlowApi<B>,
    payouts: PayoutApi<B>,
}

impl<B> Debug for JobRunner<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobRunner")
    }
}

impl<B: Clone> JobRunner<B> {
    pub fn new(db: B, config: MarketplaceConfig, orders: OrderFlowApi<B>) -> Self {
        let payouts = PayoutApi::new(db.clone(), config.retry_policy.max_attempts);
        Self { db, config, orders, payouts }
    }
}

impl<B: MarketplaceDatabase> JobRunner<B> {
    pub async fn run_due_jobs(&self, limit: i64) -> Result<RunSummary, MarketplaceError> {
        let jobs = self.db.claim_due_jobs(Utc::now(), limit, self.config.job_lock_timeout).await?;
        let mut summary = RunSummary { claimed: jobs.len(), ..Default::default() };
        for job in jobs {
            match self.execute(&job).await {
                Ok(()) => {
                    self.db.complete_job(job.id, Utc::now()).await?;
                    trace!("🕰️ Job #{} ({}) done after {} attempt(s)", job.id, job.job_key, job.attempts);
                    summary.completed += 1;
                },
                Err(e) => {
                    if self.handle_failure(&job, &e).await? {
                        summary.retried += 1;
                    } else {
                        summary.buried += 1;
                    }
                },
            }
        }
        if summary.claimed > 0 {
            debug!("🕰️ Job run: {summary:?}");
        }
        Ok(summary)
    }

    async fn execute(&self, job: &Job) -> Result<(), MarketplaceError> {
        match job.job_kind()? {
            JobKind::ReservationExpiry { order_id } => {
                self.orders.expire_reservation(order_id).await?;
            },
            JobKind::PayoutAggregation { period_start, period_end } => {
                let period = PayoutPeriod::new(period_start, period_end)?;
                self.payouts.aggregate(period).await?;
            },
        }
        Ok(())
    }

    /// Returns true if the job was put back in the queue.
    async fn handle_failure(&self, job: &Job, e: &MarketplaceError) -> Result<bool, MarketplaceError> {
        let policy = &self.config.retry_policy;
        let now = Utc::now();
        let message = e.to_string();
        if e.is_retryable() && !policy.attempts_exhausted(job.attempts, job.max_attempts) {
            let delay = Duration::from_std(policy.backoff(job.attempts)).unwrap_or_else(|_| Duration::minutes(15));
            let run_at = now + delay;
            warn!(
                "🕰️ Job #{} ({}) failed on attempt {}. Retrying at {run_at}. {message}",
                job.id, job.job_key, job.attempts
            );
            self.db.retry_job(job.id, run_at, &message, now).await?;
            Ok(true)
        } else {
            error!(
                "🕰️ DEAD LETTER: job #{} ({}) failed permanently after {} attempt(s). {message}",
                job.id, job.job_key, job.attempts
            );
            self.db.bury_job(job.id, &message, now).await?;
            Ok(false)
        }
    }
}
