//! The append-only vendor ledger. There is at most one CREDIT and one DEBIT per payment, which is what makes replayed
//! settlements and refunds harmless.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{LedgerEntry, LedgerEntryType, MinorUnits, Payment};

pub async fn fetch_entry(
    payment_id: i64,
    entry_type: LedgerEntryType,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vendor_ledger_entries WHERE payment_id = $1 AND entry_type = $2")
        .bind(payment_id)
        .bind(entry_type)
        .fetch_optional(conn)
        .await
}

/// Appends the entry for `(payment, entry_type)` unless it already exists, in which case the existing entry is
/// returned unchanged.
pub async fn insert_entry_if_absent(
    vendor_id: i64,
    payment: &Payment,
    entry_type: LedgerEntryType,
    amount: MinorUnits,
    note: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, sqlx::Error> {
    if let Some(entry) = fetch_entry(payment.id, entry_type, conn).await? {
        debug!("🗃️ {entry_type} for payment #{} already exists as entry #{}", payment.id, entry.id);
        return Ok(entry);
    }
    let entry: LedgerEntry = sqlx::query_as(
        r#"
            INSERT INTO vendor_ledger_entries (vendor_id, order_id, payment_id, entry_type, amount, currency, note,
            created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(vendor_id)
    .bind(payment.order_id)
    .bind(payment.id)
    .bind(entry_type)
    .bind(amount)
    .bind(&payment.currency)
    .bind(note)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ {entry_type} of {amount} {} recorded for vendor {vendor_id}", entry.currency);
    Ok(entry)
}

pub async fn fetch_entries_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vendor_ledger_entries WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_entries_for_vendor(
    vendor_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vendor_ledger_entries WHERE vendor_id = $1 ORDER BY id")
        .bind(vendor_id)
        .fetch_all(conn)
        .await
}
