use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Actor, Order},
    helpers::PageCursor,
    mkt_api::{errors::MarketplaceError, vendor_owner},
    state_machine::is_participant,
    traits::{data_objects::OrderDetails, MarketplaceDatabase},
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    /// Pass this back to fetch the next page. `None` on the last page.
    pub next_page: Option<String>,
}

/// `OrderQueryApi` is the read side for orders.
pub struct OrderQueryApi<B> {
    db: B,
}

impl<B> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi")
    }
}

impl<B> OrderQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B: MarketplaceDatabase> OrderQueryApi<B> {
    /// The customer's orders, newest first. `page_token` is the `next_page` of a previous call.
    pub async fn orders_for_customer(
        &self,
        customer_id: &str,
        page_token: Option<&str>,
        page_size: Option<i64>,
    ) -> Result<OrderPage, MarketplaceError> {
        let cursor = page_token.map(PageCursor::decode).transpose()?;
        let limit = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        // One extra row tells us whether there is another page
        let mut orders = self.db.fetch_orders_for_customer(customer_id, cursor.as_ref(), limit + 1).await?;
        let has_more = orders.len() as i64 > limit;
        orders.truncate(limit as usize);
        let next_page = match orders.last() {
            Some(last) if has_more => Some(PageCursor::new(last.created_at, last.id).encode()),
            _ => None,
        };
        Ok(OrderPage { orders, next_page })
    }

    /// The order with its items, payments and status history. Only the order's participants and operators may see it.
    pub async fn order_details(&self, order_id: i64, actor: &Actor) -> Result<OrderDetails, MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        let owner = vendor_owner(&self.db, &order).await?;
        if !is_participant(actor, &order, &owner) {
            return Err(MarketplaceError::Forbidden(format!("{actor} has no access to order {order_id}")));
        }
        let items = self.db.fetch_order_items(order_id).await?;
        let payments = self.db.fetch_payments_for_order(order_id).await?;
        let status_log = self.db.fetch_order_status_log(order_id).await?;
        Ok(OrderDetails { order, items, payments, status_log })
    }
}
