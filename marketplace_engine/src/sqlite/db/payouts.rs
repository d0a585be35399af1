use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use crate::db_types::{MinorUnits, PayoutBatch, PayoutItem, PayoutItemStatus};

/// Ledger totals for one vendor and currency over a period.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerTotals {
    pub vendor_id: i64,
    pub currency: String,
    pub gross: MinorUnits,
    pub refunds: MinorUnits,
}

pub async fn fetch_batch(
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutBatch>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_batches WHERE period_start = $1 AND period_end = $2")
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_items(batch_id: i64, conn: &mut SqliteConnection) -> Result<Vec<PayoutItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_items WHERE batch_id = $1 ORDER BY vendor_id, currency")
        .bind(batch_id)
        .fetch_all(conn)
        .await
}

/// Sums ledger entries created in `[period_start, period_end)` per vendor and currency.
pub async fn ledger_totals(
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerTotals>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT
                vendor_id,
                currency,
                SUM(CASE WHEN entry_type = 'CREDIT' THEN amount ELSE 0 END) AS gross,
                SUM(CASE WHEN entry_type = 'DEBIT' THEN amount ELSE 0 END) AS refunds
            FROM vendor_ledger_entries
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY vendor_id, currency
            ORDER BY vendor_id, currency
        "#,
    )
    .bind(period_start)
    .bind(period_end)
    .fetch_all(conn)
    .await
}

pub async fn insert_batch(
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PayoutBatch, sqlx::Error> {
    sqlx::query_as("INSERT INTO payout_batches (period_start, period_end, created_at) VALUES ($1, $2, $3) RETURNING *")
        .bind(period_start)
        .bind(period_end)
        .bind(now)
        .fetch_one(conn)
        .await
}

/// One item per vendor and currency: `net = gross - refunds`, READY when positive and SKIPPED otherwise.
pub async fn insert_item(
    batch_id: i64,
    totals: &LedgerTotals,
    conn: &mut SqliteConnection,
) -> Result<PayoutItem, sqlx::Error> {
    let net = totals.gross - totals.refunds;
    let status = if net.is_positive() { PayoutItemStatus::Ready } else { PayoutItemStatus::Skipped };
    let item: PayoutItem = sqlx::query_as(
        r#"
            INSERT INTO payout_items (batch_id, vendor_id, currency, gross_amount, refund_amount, net_amount, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(batch_id)
    .bind(totals.vendor_id)
    .bind(&totals.currency)
    .bind(totals.gross)
    .bind(totals.refunds)
    .bind(net)
    .bind(status)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Payout item for vendor {} in batch #{batch_id}: {net} {} ({status})", totals.vendor_id, item.currency);
    Ok(item)
}
