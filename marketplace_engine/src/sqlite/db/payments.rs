use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{NewPayment, Payment, PaymentProvider, PaymentStatus};

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, sqlx::Error> {
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, provider, provider_ref, amount, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(payment.order_id)
    .bind(payment.provider)
    .bind(payment.provider_ref)
    .bind(payment.amount)
    .bind(payment.currency)
    .bind(PaymentStatus::RequiresAction)
    .bind(payment.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment #{} ({}) created for order #{}", payment.id, payment.provider, payment.order_id);
    Ok(payment)
}

pub async fn fetch_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(payment_id).fetch_optional(conn).await
}

pub async fn fetch_payment_by_reference(
    provider: PaymentProvider,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE provider = $1 AND provider_ref = $2 ORDER BY id DESC LIMIT 1")
        .bind(provider)
        .bind(reference)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_latest_payment(
    order_id: i64,
    provider: Option<PaymentProvider>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    match provider {
        Some(provider) => {
            sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 AND provider = $2 ORDER BY id DESC LIMIT 1")
                .bind(order_id)
                .bind(provider)
                .fetch_optional(conn)
                .await
        },
        None => {
            sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id DESC LIMIT 1")
                .bind(order_id)
                .fetch_optional(conn)
                .await
        },
    }
}

/// The order's settled (SUCCEEDED or REFUNDED) payment, if any. There is at most one.
pub async fn fetch_settled_payment(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 AND status IN ('SUCCEEDED', 'REFUNDED')")
        .bind(order_id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_payments_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

pub async fn set_provider_reference(
    payment_id: i64,
    reference: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("UPDATE payments SET provider_ref = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(reference)
        .bind(now)
        .bind(payment_id)
        .fetch_optional(conn)
        .await
}

/// Marks the payment SUCCEEDED, replacing its reference when a new one is given.
pub async fn mark_succeeded(
    payment_id: i64,
    reference: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'SUCCEEDED', provider_ref = COALESCE($1, provider_ref), updated_at = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(reference)
    .bind(now)
    .bind(payment_id)
    .fetch_one(conn)
    .await
}

pub async fn mark_failed(
    payment_id: i64,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as(
        "UPDATE payments SET status = 'FAILED', failure_reason = $1, updated_at = $2 WHERE id = $3 RETURNING *",
    )
    .bind(reason)
    .bind(now)
    .bind(payment_id)
    .fetch_one(conn)
    .await
}

pub async fn mark_refunded(
    payment_id: i64,
    refund_ref: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    sqlx::query_as(
        "UPDATE payments SET status = 'REFUNDED', refund_ref = $1, updated_at = $2 WHERE id = $3 RETURNING *",
    )
    .bind(refund_ref)
    .bind(now)
    .bind(payment_id)
    .fetch_one(conn)
    .await
}
