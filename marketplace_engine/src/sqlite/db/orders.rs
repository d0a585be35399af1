use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{Actor, NewOrder, NewOrderItem, Order, OrderItem, OrderStatusLogEntry, OrderStatusType},
    helpers::PageCursor,
};

/// Inserts a new PENDING_PAYMENT order. This is not atomic on its own: embed it in a transaction together with the
/// item inserts and reservations.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id,
                vendor_id,
                status,
                currency,
                subtotal,
                shipping_fee,
                tax_amount,
                discount_amount,
                total,
                fulfillment,
                shipping_address_id,
                pickup_location_id,
                promo_code,
                payment_expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING *;
        "#,
    )
    .bind(order.customer_id)
    .bind(order.vendor_id)
    .bind(OrderStatusType::PendingPayment)
    .bind(order.currency)
    .bind(order.subtotal)
    .bind(order.shipping_fee)
    .bind(order.tax_amount)
    .bind(order.discount_amount)
    .bind(order.total)
    .bind(order.fulfillment)
    .bind(order.shipping_address_id)
    .bind(order.pickup_location_id)
    .bind(order.promo_code)
    .bind(order.payment_expires_at)
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await?;
    let actor = Actor::Customer(order.customer_id.clone()).label();
    insert_status_log(order.id, None, OrderStatusType::PendingPayment, &actor, order.created_at, conn).await?;
    debug!("🗃️ Order #{} inserted for {} {}", order.id, order.total, order.currency);
    Ok(order)
}

pub async fn insert_order_items(
    order_id: i64,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let item = sqlx::query_as(
            r#"
                INSERT INTO order_items (order_id, variant_id, title, qty, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *;
            "#,
        )
        .bind(order_id)
        .bind(item.variant_id)
        .bind(&item.title)
        .bind(item.qty)
        .bind(item.unit_price)
        .bind(item.line_total)
        .fetch_one(&mut *conn)
        .await?;
        result.push(item);
    }
    Ok(result)
}

pub async fn fetch_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Sets the order status and appends the change to the status log. `payment_expires_at` only survives while the order
/// is PENDING_PAYMENT.
///
/// No transition rules are checked here. Callers are responsible for that.
pub async fn update_status(
    order: &Order,
    to: OrderStatusType,
    actor: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let updated: Order = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = $1,
                payment_expires_at = CASE WHEN $1 = 'PENDING_PAYMENT' THEN payment_expires_at ELSE NULL END,
                updated_at = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(to)
    .bind(now)
    .bind(order.id)
    .fetch_one(&mut *conn)
    .await?;
    insert_status_log(order.id, Some(order.status), to, actor, now, conn).await?;
    debug!("🗃️ Order #{} moved from {} to {to} by {actor}", order.id, order.status);
    Ok(updated)
}

async fn insert_status_log(
    order_id: i64,
    from: Option<OrderStatusType>,
    to: OrderStatusType,
    actor: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_status_log (order_id, from_status, to_status, actor, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order_id)
    .bind(from)
    .bind(to)
    .bind(actor)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_status_log(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusLogEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_status_log WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// PENDING_PAYMENT orders whose reservation window closed before `now`, oldest first.
pub async fn fetch_expired_pending(
    now: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
            SELECT id FROM orders
            WHERE status = 'PENDING_PAYMENT' AND payment_expires_at IS NOT NULL AND payment_expires_at <= $1
            ORDER BY payment_expires_at
            LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await
}

/// A page of the customer's orders, newest first. With a cursor, only orders strictly after it (in that ordering) are
/// returned.
pub async fn fetch_orders_for_customer(
    customer_id: &str,
    after: Option<&PageCursor>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders WHERE customer_id = ");
    builder.push_bind(customer_id);
    if let Some(cursor) = after {
        builder.push(" AND (created_at < ");
        builder.push_bind(cursor.timestamp);
        builder.push(" OR (created_at = ");
        builder.push_bind(cursor.timestamp);
        builder.push(" AND id < ");
        builder.push_bind(cursor.id);
        builder.push("))");
    }
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(limit);
    trace!("🗃️ Executing query: {}", builder.sql());
    builder.build_query_as::<Order>().fetch_all(conn).await
}
