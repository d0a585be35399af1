use std::fmt::Debug;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    jobs::{JobKind, NewJob},
    mkt_api::errors::MarketplaceError,
    traits::{data_objects::PayoutBatchResult, MarketplaceDatabase},
};

/// A half-open payout period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PayoutPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, MarketplaceError> {
        if start >= end {
            return Err(MarketplaceError::InvalidPayoutPeriod(format!("{start} is not before {end}")));
        }
        Ok(Self { start, end })
    }

    /// The most recently completed Monday-to-Monday week (UTC) before `now`.
    pub fn last_completed_week(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let days_since_monday = i64::from(today.weekday().num_days_from_monday());
        let this_monday = today - Duration::days(days_since_monday);
        let end = Utc.from_utc_datetime(&this_monday.and_time(chrono::NaiveTime::MIN));
        Self { start: end - Duration::days(7), end }
    }
}

/// `PayoutApi` turns the vendor ledger into payout batches.
pub struct PayoutApi<B> {
    db: B,
    max_attempts: i64,
}

impl<B> Debug for PayoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B> PayoutApi<B> {
    pub fn new(db: B, max_attempts: i64) -> Self {
        Self { db, max_attempts }
    }
}

impl<B: MarketplaceDatabase> PayoutApi<B> {
    /// Builds the batch for `period`, or returns the existing one. Running this twice for the same period yields the
    /// same batch and no new rows.
    pub async fn aggregate(&self, period: PayoutPeriod) -> Result<PayoutBatchResult, MarketplaceError> {
        let result = self.db.create_payout_batch(period.start, period.end, Utc::now()).await?;
        if result.created {
            let ready = result.items.iter().filter(|i| i.net_amount.is_positive()).count();
            info!(
                "💰 Payout batch #{} for {} - {}: {ready} of {} vendor balances ready",
                result.batch.id,
                period.start,
                period.end,
                result.items.len()
            );
        }
        Ok(result)
    }

    pub async fn batch_for(&self, period: PayoutPeriod) -> Result<Option<PayoutBatchResult>, MarketplaceError> {
        let Some(batch) = self.db.fetch_payout_batch(period.start, period.end).await? else {
            return Ok(None);
        };
        let items = self.db.fetch_payout_items(batch.id).await?;
        Ok(Some(PayoutBatchResult { batch, items, created: false }))
    }

    /// Queues aggregation for `period` on the job queue. Scheduling the same period twice queues one job.
    pub async fn schedule(&self, period: PayoutPeriod) -> Result<i64, MarketplaceError> {
        let kind = JobKind::PayoutAggregation { period_start: period.start, period_end: period.end };
        let now = Utc::now();
        let job = NewJob::new(kind, now).with_max_attempts(self.max_attempts);
        let result = self.db.enqueue_job(job, now).await?;
        debug!("💰 Payout aggregation for {} - {} queued as job #{}", period.start, period.end, result.job_id);
        Ok(result.job_id)
    }
}
