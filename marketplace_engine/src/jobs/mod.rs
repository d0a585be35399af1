//! Durable, at-least-once background jobs.
//!
//! Jobs are stored through the [`crate::traits::JobQueue`] backend and executed by [`JobRunner`]. Every job carries a
//! uniqueness key; enqueueing a job whose key is already queued or running collapses onto the existing job.
mod runner;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub use runner::{JobRunner, RunSummary};

use crate::{db_types::JobStatus, mkt_api::errors::MarketplaceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Cancel the order and release its reservation if it is still unpaid at `payment_expires_at`.
    ReservationExpiry { order_id: i64 },
    /// Build the payout batch for `[period_start, period_end)`.
    PayoutAggregation { period_start: DateTime<Utc>, period_end: DateTime<Utc> },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::ReservationExpiry { .. } => "reservation_expiry",
            JobKind::PayoutAggregation { .. } => "payout_aggregation",
        }
    }

    /// The uniqueness key. Duplicate enqueues of the same key collapse onto one active job.
    pub fn key(&self) -> String {
        match self {
            JobKind::ReservationExpiry { order_id } => format!("reservation-expiry:{order_id}"),
            JobKind::PayoutAggregation { period_start, period_end } => {
                let start = period_start.to_rfc3339_opts(SecondsFormat::AutoSi, true);
                let end = period_end.to_rfc3339_opts(SecondsFormat::AutoSi, true);
                format!("payout:{start}:{end}")
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub kind: JobKind,
    pub run_at: DateTime<Utc>,
    pub max_attempts: i64,
}

impl NewJob {
    pub fn new(kind: JobKind, run_at: DateTime<Utc>) -> Self {
        Self { kind, run_at, max_attempts: crate::config::DEFAULT_JOB_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: i64) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn key(&self) -> String {
        self.kind.key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_key: String,
    pub kind: String,
    pub payload: String,
    pub run_at: DateTime<Utc>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub status: JobStatus,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn job_kind(&self) -> Result<JobKind, MarketplaceError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Result of an enqueue. `duplicate` is true when an active job with the same key already existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueResult {
    pub job_id: i64,
    pub duplicate: bool,
}
