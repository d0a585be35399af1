//! Background workers. Do not await the returned `JoinHandle`s, as they run indefinitely.
//!
//! * The job worker runs due jobs from the durable queue (reservation expiry and payout aggregation).
//! * The expiry sweep cancels overdue unpaid orders whose expiry job was lost.
//! * The payout scheduler queues the aggregation for the last completed week. Queuing the same week twice collapses
//!   onto one job, so the scheduler can check as often as it likes.
use std::time::Duration;

use chrono::Utc;
use log::*;
use marketplace_engine::{
    events::EventProducers,
    JobRunner,
    MarketplaceConfig,
    OrderFlowApi,
    PayoutApi,
    PayoutPeriod,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

const EXPIRY_SWEEP_BATCH: i64 = 100;

pub fn start_job_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    config: MarketplaceConfig,
    poll_interval: Duration,
    batch_size: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let orders = OrderFlowApi::new(db.clone(), producers);
        let runner = JobRunner::new(db, config, orders);
        let mut timer = tokio::time::interval(poll_interval);
        info!("🕰️ Job worker started");
        loop {
            timer.tick().await;
            match runner.run_due_jobs(batch_size).await {
                Ok(summary) if summary.claimed > 0 => info!(
                    "🕰️ {} jobs run. {} done, {} retrying, {} dead-lettered",
                    summary.claimed, summary.completed, summary.retried, summary.buried
                ),
                Ok(_) => trace!("🕰️ No jobs due"),
                Err(e) => error!("🕰️ Error running due jobs: {e}"),
            }
        }
    })
}

pub fn start_expiry_sweep(db: SqliteDatabase, producers: EventProducers, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OrderFlowApi::new(db, producers);
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Reservation expiry sweep started");
        loop {
            timer.tick().await;
            match api.sweep_expired_reservations(EXPIRY_SWEEP_BATCH).await {
                Ok(expired) if !expired.is_empty() => {
                    let ids = expired.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ");
                    debug!("🕰️ Expired orders: {ids}");
                },
                Ok(_) => trace!("🕰️ No overdue reservations"),
                Err(e) => error!("🕰️ Error running reservation expiry sweep: {e}"),
            }
        }
    })
}

pub fn start_payout_scheduler(db: SqliteDatabase, max_attempts: i64, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = PayoutApi::new(db, max_attempts);
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Weekly payout scheduler started");
        loop {
            timer.tick().await;
            let period = PayoutPeriod::last_completed_week(Utc::now());
            match api.batch_for(period).await {
                Ok(Some(_)) => trace!("🕰️ Payouts for {} to {} are already aggregated", period.start, period.end),
                Ok(None) => match api.schedule(period).await {
                    Ok(job_id) => {
                        debug!("🕰️ Payout aggregation for {} to {} queued as job #{job_id}", period.start, period.end)
                    },
                    Err(e) => error!("🕰️ Could not queue the payout aggregation for {}. {e}", period.start),
                },
                Err(e) => error!("🕰️ Could not check for the payout batch starting {}. {e}", period.start),
            }
        }
    })
}
