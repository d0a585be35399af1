use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{MinorUnits, Order, ReturnRequest, ReturnStatus};

pub async fn insert_return(
    order: &Order,
    reason: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReturnRequest, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO return_requests (order_id, customer_id, vendor_id, reason, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(&order.customer_id)
    .bind(order.vendor_id)
    .bind(reason)
    .bind(ReturnStatus::Requested)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_return(return_id: i64, conn: &mut SqliteConnection) -> Result<Option<ReturnRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM return_requests WHERE id = $1").bind(return_id).fetch_optional(conn).await
}

pub async fn fetch_open_return(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ReturnRequest>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM return_requests WHERE order_id = $1 AND status IN ('REQUESTED', 'APPROVED', 'RECEIVED')",
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await
}

pub async fn update_status(
    return_id: i64,
    status: ReturnStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReturnRequest, sqlx::Error> {
    sqlx::query_as("UPDATE return_requests SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(status)
        .bind(now)
        .bind(return_id)
        .fetch_one(conn)
        .await
}

/// Moves the return to REFUNDED and fills in the refund fields, which are empty in every other status.
pub async fn mark_refunded(
    return_id: i64,
    amount: MinorUnits,
    reference: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReturnRequest, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE return_requests
            SET status = 'REFUNDED', refund_amount = $1, refund_reference = $2, refunded_at = $3, updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(reference)
    .bind(now)
    .bind(return_id)
    .fetch_one(conn)
    .await
}
