use chrono::Utc;
use marketplace_engine::{
    db_types::{JobStatus, NewPayment, PaymentProvider},
    jobs::{JobKind, NewJob},
    sqlite::db::{catalog, jobs, payments},
    JobQueue,
    PaymentManagement,
};

mod support;
use support::*;

/// Every write is committed before it returns, so a read on any other pooled connection sees it.
#[tokio::test]
async fn writes_are_visible_on_every_pooled_connection() {
    let db = setup().await;
    let now = Utc::now();
    let shop = seed_shop(&db, 1000, 5, 300).await;
    let placed = place_pickup_order(&db, &shop, "alice", 1).await;
    let payment = NewPayment {
        order_id: placed.order.id,
        provider: PaymentProvider::MobileMoneyB,
        provider_ref: Some("mmb_0011223344".into()),
        amount: placed.order.total,
        currency: placed.order.currency.clone(),
        created_at: now,
    };
    let payment = db.insert_payment(payment).await.unwrap();
    let job = db.enqueue_job(NewJob::new(JobKind::ReservationExpiry { order_id: 99 }, now), now).await.unwrap();
    db.complete_job(job.job_id, now).await.unwrap();

    // Hold the whole pool so that every read below runs on a different connection
    let mut conns = Vec::new();
    for _ in 0..5 {
        conns.push(db.pool().acquire().await.unwrap());
    }
    for conn in conns.iter_mut() {
        let variant = catalog::fetch_variant(shop.variant_id, conn).await.unwrap();
        assert_eq!(variant.map(|v| v.reserved_qty), Some(1));
        let found = payments::fetch_payment_by_reference(PaymentProvider::MobileMoneyB, "mmb_0011223344", conn)
            .await
            .unwrap()
            .expect("payment is visible");
        assert_eq!(found.id, payment.id);
        let job = jobs::fetch_job(job.job_id, conn).await.unwrap().expect("job is visible");
        assert_eq!(job.status, JobStatus::Done);
    }
    drop(conns);
    tear_down(db).await;
}
