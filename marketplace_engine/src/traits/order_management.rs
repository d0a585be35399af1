use chrono::{DateTime, Duration, Utc};

use crate::{
    checkout::CheckoutRequest,
    db_types::{Actor, Order, OrderItem, OrderStatusLogEntry, OrderStatusType},
    helpers::PageCursor,
    mkt_api::errors::MarketplaceError,
    traits::{
        data_objects::{ExpiryOutcome, PlacedOrder, TransitionOutcome},
        DiscountResolver,
    },
};

/// Order creation, the state machine and reservation expiry.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketplaceError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, MarketplaceError>;

    async fn fetch_order_status_log(&self, order_id: i64) -> Result<Vec<OrderStatusLogEntry>, MarketplaceError>;

    /// Checks out the customer's cart in a single transaction:
    /// 1. loads and validates the cart, vendor, products and stock,
    /// 2. validates the fulfillment selection and prices shipping,
    /// 3. resolves the promotion discount (if a code was given),
    /// 4. inserts the order (PENDING_PAYMENT, expiring after `reservation_window`) and its item snapshots,
    /// 5. reserves stock with a conditional update per item,
    /// 6. deletes the cart.
    ///
    /// Nothing is scheduled here; the caller schedules reservation expiry after the commit.
    async fn place_order<D: DiscountResolver>(
        &self,
        request: &CheckoutRequest,
        discounts: &D,
        reservation_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<PlacedOrder, MarketplaceError>;

    /// Authorizes `actor`, checks the transition table and applies the change (with its stock side effects) in one
    /// transaction. Requesting the current status returns `applied: false` without touching anything.
    async fn transition_order(
        &self,
        order_id: i64,
        to: OrderStatusType,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, MarketplaceError>;

    /// Cancels the order and releases its reservation if it is still PENDING_PAYMENT and `payment_expires_at` has
    /// passed. Anything else is a no-op, so this is safe to run any number of times.
    async fn expire_reservation(&self, order_id: i64, now: DateTime<Utc>) -> Result<ExpiryOutcome, MarketplaceError>;

    /// Ids of PENDING_PAYMENT orders whose reservation window has passed, oldest first.
    async fn fetch_expired_pending_orders(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<i64>, MarketplaceError>;

    /// The customer's orders, newest first, strictly older than `after` when given.
    async fn fetch_orders_for_customer(
        &self,
        customer_id: &str,
        after: Option<&PageCursor>,
        limit: i64,
    ) -> Result<Vec<Order>, MarketplaceError>;
}
