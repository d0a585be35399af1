use std::time::Duration;

use chrono::Utc;
use marketplace_engine::{
    checkout::CheckoutRequest,
    db_types::{JobStatus, OrderStatusType},
    events::EventProducers,
    jobs::{JobKind, NewJob},
    CheckoutApi,
    JobQueue,
    JobRunner,
    MarketplaceConfig,
    OrderFlowApi,
    OrderManagement,
    SqliteDatabase,
};

mod support;
use support::*;

fn runner(db: &SqliteDatabase, config: MarketplaceConfig) -> JobRunner<SqliteDatabase> {
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    JobRunner::new(db.clone(), config, orders)
}

#[tokio::test]
async fn checkout_schedules_the_reservation_expiry() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_shipping_order(&db, &shop, "alice", 1).await;
    let key = JobKind::ReservationExpiry { order_id: placed.order.id }.key();
    let job = db.fetch_job_by_key(&key).await.unwrap().expect("expiry job");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(Some(job.run_at), placed.order.payment_expires_at);
    // Not due yet
    let summary = runner(&db, MarketplaceConfig::default()).run_due_jobs(10).await.unwrap();
    assert_eq!(summary.claimed, 0);
    tear_down(db).await;
}

#[tokio::test]
async fn due_expiry_jobs_cancel_unpaid_orders() {
    let db = setup().await;
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let config = MarketplaceConfig { reservation_window: Duration::from_millis(1), ..Default::default() };
    let checkout = CheckoutApi::new(db.clone(), EventProducers::default(), config.clone());
    let address_id = add_address(&db, "alice").await;
    checkout.add_to_cart("alice", shop.variant_id, 2).await.unwrap();
    let placed = checkout.checkout(&CheckoutRequest::shipping("alice", address_id)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let summary = runner(&db, config.clone()).run_due_jobs(10).await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.completed, 1);
    let order = db.fetch_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Canceled);
    let key = JobKind::ReservationExpiry { order_id: placed.order.id }.key();
    let job = db.fetch_job_by_key(&key).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.attempts, 1);
    tear_down(db).await;
}

#[tokio::test]
async fn duplicate_keys_collapse_onto_the_active_job() {
    let db = setup().await;
    let now = Utc::now();
    let kind = JobKind::ReservationExpiry { order_id: 77 };
    let first = db.enqueue_job(NewJob::new(kind.clone(), now), now).await.unwrap();
    let second = db.enqueue_job(NewJob::new(kind.clone(), now), now).await.unwrap();
    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.job_id, second.job_id);

    // Once the job has finished, the key is free again
    let claimed = db.claim_due_jobs(now, 10, Duration::from_secs(60)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    db.complete_job(first.job_id, now).await.unwrap();
    let third = db.enqueue_job(NewJob::new(kind, now), now).await.unwrap();
    assert!(!third.duplicate);
    assert_ne!(third.job_id, first.job_id);
    tear_down(db).await;
}

#[tokio::test]
async fn lapsed_locks_are_claimed_again() {
    let db = setup().await;
    let now = Utc::now();
    let job = db.enqueue_job(NewJob::new(JobKind::ReservationExpiry { order_id: 5 }, now), now).await.unwrap();
    let claimed = db.claim_due_jobs(now, 10, Duration::from_secs(30)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].status, JobStatus::Running);
    // Still locked
    assert!(db.claim_due_jobs(now, 10, Duration::from_secs(30)).await.unwrap().is_empty());
    // The worker died. After the lock lapses, someone else picks it up.
    let later = now + chrono::Duration::seconds(31);
    let reclaimed = db.claim_due_jobs(later, 10, Duration::from_secs(30)).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, job.job_id);
    assert_eq!(reclaimed[0].attempts, 2);
    tear_down(db).await;
}

#[tokio::test]
async fn permanent_failures_are_dead_lettered() {
    let db = setup().await;
    let now = Utc::now();
    // An empty period can never be aggregated
    let kind = JobKind::PayoutAggregation { period_start: now, period_end: now };
    let job = db.enqueue_job(NewJob::new(kind, now), now).await.unwrap();
    let summary = runner(&db, MarketplaceConfig::default()).run_due_jobs(10).await.unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.buried, 1);
    let job = db.fetch_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Dead);
    assert!(job.last_error.unwrap().contains("payout period"));
    tear_down(db).await;
}

#[tokio::test]
async fn retried_jobs_wait_for_their_backoff() {
    let db = setup().await;
    let now = Utc::now();
    let job = db.enqueue_job(NewJob::new(JobKind::ReservationExpiry { order_id: 9 }, now), now).await.unwrap();
    db.claim_due_jobs(now, 10, Duration::from_secs(30)).await.unwrap();
    let run_at = now + chrono::Duration::seconds(10);
    db.retry_job(job.job_id, run_at, "database is busy", now).await.unwrap();
    let stored = db.fetch_job(job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.last_error.as_deref(), Some("database is busy"));
    assert!(db.claim_due_jobs(now, 10, Duration::from_secs(30)).await.unwrap().is_empty());
    assert_eq!(db.claim_due_jobs(run_at, 10, Duration::from_secs(30)).await.unwrap().len(), 1);
    tear_down(db).await;
}
