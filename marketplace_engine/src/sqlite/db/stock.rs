//! The stock ledger: per-variant `stock_qty` and `reserved_qty`.
//!
//! Every decrement is clamped with `MIN(current, requested)`, so `0 <= reserved_qty <= stock_qty` holds whatever the
//! sequence of calls. The schema enforces the same invariant with a CHECK constraint.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderItem, ProductVariant},
    mkt_api::errors::MarketplaceError,
};

/// Reserves `qty` units, but only if `reserved_qty + qty <= stock_qty` at the moment of the update. Two checkouts
/// racing for the last units cannot both succeed.
pub async fn reserve(
    variant_id: i64,
    qty: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    let result = sqlx::query(
        r#"
            UPDATE product_variants
            SET reserved_qty = reserved_qty + $1, updated_at = $2
            WHERE id = $3 AND reserved_qty + $1 <= stock_qty
        "#,
    )
    .bind(qty)
    .bind(now)
    .bind(variant_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock_qty - reserved_qty FROM product_variants WHERE id = $1")
                .bind(variant_id)
                .fetch_optional(conn)
                .await?;
        return match available {
            Some(available) => Err(MarketplaceError::InsufficientStock { variant_id, requested: qty, available }),
            None => Err(MarketplaceError::VariantNotFound(variant_id)),
        };
    }
    trace!("🗃️ Reserved {qty} of variant {variant_id}");
    Ok(())
}

/// Gives back up to `qty` reserved units.
pub async fn release(
    variant_id: i64,
    qty: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE product_variants
            SET reserved_qty = reserved_qty - MIN(reserved_qty, $1), updated_at = $2
            WHERE id = $3
        "#,
    )
    .bind(qty)
    .bind(now)
    .bind(variant_id)
    .execute(conn)
    .await?;
    trace!("🗃️ Released up to {qty} of variant {variant_id}");
    Ok(())
}

/// Turns a reservation into a sale: both the reservation and the stock drop by up to `qty`.
pub async fn consume(
    variant_id: i64,
    qty: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    // Assignments see the pre-update row, so both MIN() terms use the old values
    sqlx::query(
        r#"
            UPDATE product_variants
            SET reserved_qty = reserved_qty - MIN(reserved_qty, $1),
                stock_qty = stock_qty - MIN(stock_qty, $1),
                updated_at = $2
            WHERE id = $3
        "#,
    )
    .bind(qty)
    .bind(now)
    .bind(variant_id)
    .execute(conn)
    .await?;
    trace!("🗃️ Consumed up to {qty} of variant {variant_id}");
    Ok(())
}

pub async fn restock(
    variant_id: i64,
    qty: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductVariant>, MarketplaceError> {
    if qty <= 0 {
        return Err(MarketplaceError::ValidationError(format!("Cannot restock {qty} units")));
    }
    let variant = sqlx::query_as(
        "UPDATE product_variants SET stock_qty = stock_qty + $1, updated_at = $2 WHERE id = $3 RETURNING *",
    )
    .bind(qty)
    .bind(now)
    .bind(variant_id)
    .fetch_optional(conn)
    .await?;
    Ok(variant)
}

pub async fn release_items(
    items: &[OrderItem],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for item in items {
        release(item.variant_id, item.qty, now, conn).await?;
    }
    Ok(())
}

pub async fn consume_items(
    items: &[OrderItem],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    for item in items {
        consume(item.variant_id, item.qty, now, conn).await?;
    }
    Ok(())
}

/// Puts sold units back on the shelf (a paid order was cancelled).
pub async fn restock_items(
    items: &[OrderItem],
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), MarketplaceError> {
    for item in items {
        restock(item.variant_id, item.qty, now, conn).await?;
    }
    Ok(())
}
