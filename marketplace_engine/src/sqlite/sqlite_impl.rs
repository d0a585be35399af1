//! `SqliteDatabase` is the SQLite backend of the marketplace engine.
//!
//! It implements all the traits defined in the [`traits`](crate::traits) module. Every write runs inside an
//! [`ImmediateTransaction`] and is committed before the call returns, so the write lock is held from the first read
//! that informs a decision until the commit, and the result is visible to every other pooled connection.
use std::{fmt::Debug, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{
    catalog,
    db_url,
    jobs,
    ledger,
    new_pool,
    orders,
    payments,
    payouts,
    returns,
    stock,
    ImmediateTransaction,
};
use crate::{
    checkout::{price_lines, subtotal, validate_cart, CheckoutRequest, OrderTotals},
    db_types::{
        Actor,
        Address,
        Cart,
        CartItem,
        FulfillmentKind,
        LedgerEntry,
        LedgerEntryType,
        MinorUnits,
        NewAddress,
        NewOrder,
        NewPayment,
        NewProduct,
        NewShippingRate,
        NewVariant,
        NewVendor,
        Order,
        OrderItem,
        OrderStatusLogEntry,
        OrderStatusType,
        Payment,
        PaymentProvider,
        PaymentStatus,
        PayoutBatch,
        PayoutItem,
        PickupLocation,
        Product,
        ProductVariant,
        ReturnRequest,
        ReturnStatus,
        ShippingRate,
        Vendor,
        VendorStatus,
    },
    helpers::PageCursor,
    jobs::{EnqueueResult, Job, NewJob},
    mkt_api::errors::MarketplaceError,
    state_machine::{authorize, check_transition, completed_status, is_participant, TransitionCheck},
    traits::{
        data_objects::{
            ExpiryOutcome,
            FailureOutcome,
            PayoutBatchResult,
            PlacedOrder,
            RefundOutcome,
            ReturnOutcome,
            SettlementOutcome,
            TransitionOutcome,
        },
        CatalogManagement,
        DiscountResolver,
        JobQueue,
        MarketplaceDatabase,
        OrderManagement,
        PaymentManagement,
        PayoutManagement,
        ReturnManagement,
    },
};

const SYSTEM: &str = "system";

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `MKT_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        debug!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin(&self) -> Result<ImmediateTransaction, MarketplaceError> {
        Ok(ImmediateTransaction::begin(&self.pool).await?)
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

async fn fetch_order_or_fail(
    order_id: i64,
    conn: &mut sqlx::SqliteConnection,
) -> Result<Order, MarketplaceError> {
    orders::fetch_order(order_id, conn).await?.ok_or(MarketplaceError::OrderNotFound(order_id))
}

async fn fetch_payment_or_fail(
    payment_id: i64,
    conn: &mut sqlx::SqliteConnection,
) -> Result<Payment, MarketplaceError> {
    payments::fetch_payment(payment_id, conn)
        .await?
        .ok_or_else(|| MarketplaceError::PaymentNotFound(format!("payment #{payment_id}")))
}

async fn fetch_return_or_fail(
    return_id: i64,
    conn: &mut sqlx::SqliteConnection,
) -> Result<ReturnRequest, MarketplaceError> {
    returns::fetch_return(return_id, conn).await?.ok_or(MarketplaceError::ReturnNotFound(return_id))
}

//--------------------------------------   OrderManagement     ---------------------------------------------------------
impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(order_id, &mut conn).await?)
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_items(order_id, &mut conn).await?)
    }

    async fn fetch_order_status_log(&self, order_id: i64) -> Result<Vec<OrderStatusLogEntry>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_status_log(order_id, &mut conn).await?)
    }

    /// Validates the cart, snapshots prices, inserts the order and reserves stock, all in one write transaction. If
    /// any reservation fails, nothing is written and the cart is left as it was.
    async fn place_order<D: DiscountResolver>(
        &self,
        request: &CheckoutRequest,
        discounts: &D,
        reservation_window: Duration,
        now: DateTime<Utc>,
    ) -> Result<PlacedOrder, MarketplaceError> {
        let mut tx = self.begin().await?;
        let customer_id = request.customer_id.as_str();
        let cart = catalog::fetch_cart(customer_id, &mut tx).await?.ok_or(MarketplaceError::CartEmpty)?;
        let lines = catalog::fetch_cart_lines(cart.id, &mut tx).await?;
        let vendor = catalog::fetch_vendor(cart.vendor_id, &mut tx)
            .await?
            .ok_or(MarketplaceError::VendorNotFound(cart.vendor_id))?;
        validate_cart(&vendor, &cart.currency, &lines)?;
        let (shipping_address_id, pickup_location_id, shipping_fee) = match request.fulfillment {
            FulfillmentKind::Shipping => {
                let address_id = request.shipping_address_id.ok_or(MarketplaceError::ShippingAddressRequired)?;
                let address = catalog::fetch_owned_address(address_id, customer_id, &mut tx)
                    .await?
                    .ok_or(MarketplaceError::ShippingAddressNotFound(address_id))?;
                let rate = catalog::fetch_active_shipping_rate(vendor.id, &address.country, &cart.currency, &mut tx)
                    .await?
                    .ok_or_else(|| MarketplaceError::ShippingRateUnavailable {
                        country: address.country.clone(),
                        currency: cart.currency.clone(),
                    })?;
                (Some(address.id), None, rate.fee)
            },
            FulfillmentKind::Pickup => {
                let location_id = request.pickup_location_id.ok_or(MarketplaceError::PickupLocationRequired)?;
                let location = catalog::fetch_vendor_pickup_location(location_id, vendor.id, &mut tx)
                    .await?
                    .ok_or(MarketplaceError::PickupLocationNotFound(location_id))?;
                (None, Some(location.id), MinorUnits::zero())
            },
        };
        let new_items = price_lines(&lines)?;
        let subtotal = subtotal(&new_items)?;
        let before_discount = subtotal
            .checked_add(shipping_fee)
            .ok_or_else(|| MarketplaceError::AmountOutOfRange("order total".into()))?;
        let discount = request
            .promo_code
            .as_deref()
            .map(|code| discounts.resolve(code, before_discount, vendor.id))
            .unwrap_or_default();
        let totals = OrderTotals::compute(subtotal, shipping_fee, discount)?;
        let new_order = NewOrder {
            customer_id: customer_id.to_string(),
            vendor_id: vendor.id,
            currency: cart.currency.clone(),
            subtotal: totals.subtotal,
            shipping_fee: totals.shipping_fee,
            tax_amount: totals.tax_amount,
            discount_amount: totals.discount_amount,
            total: totals.total,
            fulfillment: request.fulfillment,
            shipping_address_id,
            pickup_location_id,
            promo_code: request.promo_code.clone(),
            payment_expires_at: now + reservation_window,
            created_at: now,
        };
        let order = orders::insert_order(new_order, &mut tx).await?;
        let items = orders::insert_order_items(order.id, &new_items, &mut tx).await?;
        for item in &items {
            stock::reserve(item.variant_id, item.qty, now, &mut tx).await?;
        }
        catalog::delete_cart(cart.id, &mut tx).await?;
        tx.commit().await?;
        info!("🛒 Order #{} placed by {customer_id} for {} {}", order.id, order.total, order.currency);
        Ok(PlacedOrder { order, items, vendor_owner: vendor.owner_user_id })
    }

    async fn transition_order(
        &self,
        order_id: i64,
        to: OrderStatusType,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let order = fetch_order_or_fail(order_id, &mut tx).await?;
        let vendor_owner = catalog::vendor_owner(order.vendor_id, &mut tx).await?;
        if !is_participant(actor, &order, &vendor_owner) {
            return Err(MarketplaceError::Forbidden(format!("{actor} has no access to order {order_id}")));
        }
        let previous = order.status;
        if previous == to {
            debug!("📦 Order #{order_id} is already {to}. Nothing to do.");
            return Ok(TransitionOutcome { order, previous, vendor_owner, applied: false });
        }
        authorize(actor, &order, &vendor_owner, to)?;
        if check_transition(&order, to)? == TransitionCheck::NoOp {
            return Ok(TransitionOutcome { order, previous, vendor_owner, applied: false });
        }
        if to == OrderStatusType::Canceled {
            let items = orders::fetch_order_items(order_id, &mut tx).await?;
            match previous {
                OrderStatusType::PendingPayment => stock::release_items(&items, now, &mut tx).await?,
                OrderStatusType::Paid => {
                    stock::restock_items(&items, now, &mut tx).await?;
                    warn!("📦 Paid order #{order_id} was cancelled by {actor}. The payment must be refunded.");
                },
                _ => {},
            }
        }
        let updated = orders::update_status(&order, to, &actor.label(), now, &mut tx).await?;
        tx.commit().await?;
        info!("📦 Order #{order_id} moved from {previous} to {to} by {actor}");
        Ok(TransitionOutcome { order: updated, previous, vendor_owner, applied: true })
    }

    async fn expire_reservation(&self, order_id: i64, now: DateTime<Utc>) -> Result<ExpiryOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let Some(order) = orders::fetch_order(order_id, &mut tx).await? else {
            return Ok(ExpiryOutcome::OrderMissing);
        };
        if order.status != OrderStatusType::PendingPayment {
            return Ok(ExpiryOutcome::NotPending(order.status));
        }
        match order.payment_expires_at {
            Some(expires_at) if expires_at <= now => {},
            other => return Ok(ExpiryOutcome::NotDue(other)),
        }
        let items = orders::fetch_order_items(order_id, &mut tx).await?;
        stock::release_items(&items, now, &mut tx).await?;
        let order = orders::update_status(&order, OrderStatusType::Canceled, SYSTEM, now, &mut tx).await?;
        tx.commit().await?;
        info!("🕰️ Reservation for order #{order_id} expired. The order has been cancelled.");
        Ok(ExpiryOutcome::Expired(order))
    }

    async fn fetch_expired_pending_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<i64>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_expired_pending(now, limit, &mut conn).await?)
    }

    async fn fetch_orders_for_customer(
        &self,
        customer_id: &str,
        after: Option<&PageCursor>,
        limit: i64,
    ) -> Result<Vec<Order>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_orders_for_customer(customer_id, after, limit, &mut conn).await?)
    }
}

//--------------------------------------  PaymentManagement    ---------------------------------------------------------
impl PaymentManagement for SqliteDatabase {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, MarketplaceError> {
        let mut tx = self.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn attach_provider_reference(
        &self,
        payment_id: i64,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Payment, MarketplaceError> {
        let mut tx = self.begin().await?;
        let payment = payments::set_provider_reference(payment_id, reference, now, &mut tx)
            .await?
            .ok_or_else(|| MarketplaceError::PaymentNotFound(format!("payment #{payment_id}")))?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Applies a success confirmation. Replays of the same confirmation change nothing.
    async fn settle_payment(
        &self,
        payment_id: i64,
        provider_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let payment = fetch_payment_or_fail(payment_id, &mut tx).await?;
        if payment.status.is_settled() {
            debug!("💳 Payment #{payment_id} is already {}. Ignoring the confirmation.", payment.status);
            return Ok(SettlementOutcome::AlreadySettled(payment));
        }
        let order = fetch_order_or_fail(payment.order_id, &mut tx).await?;
        if order.status != OrderStatusType::PendingPayment {
            let already_paid = payments::fetch_settled_payment(order.id, &mut tx).await?.is_some();
            if already_paid || order.status != OrderStatusType::Canceled {
                let reason = "The order has already been paid";
                let payment = payments::mark_failed(payment_id, reason, now, &mut tx).await?;
                tx.commit().await?;
                warn!("💳 Payment #{payment_id} succeeded, but order #{} was already paid.", order.id);
                return Ok(SettlementOutcome::OrderAlreadyPaid { order, payment });
            }
            let payment = payments::mark_succeeded(payment_id, provider_ref, now, &mut tx).await?;
            tx.commit().await?;
            warn!(
                "💳 Payment #{payment_id} succeeded after order #{} was cancelled. It needs a manual refund.",
                order.id
            );
            return Ok(SettlementOutcome::LateForCancelledOrder { order, payment });
        }
        let items = orders::fetch_order_items(order.id, &mut tx).await?;
        stock::consume_items(&items, now, &mut tx).await?;
        let payment = payments::mark_succeeded(payment_id, provider_ref, now, &mut tx).await?;
        let order = orders::update_status(&order, OrderStatusType::Paid, SYSTEM, now, &mut tx).await?;
        let note = format!("Payment #{} for order #{}", payment.id, order.id);
        let credit = ledger::insert_entry_if_absent(
            order.vendor_id,
            &payment,
            LedgerEntryType::Credit,
            payment.amount,
            &note,
            now,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("💳 Payment #{payment_id} settled. Order #{} is paid.", order.id);
        Ok(SettlementOutcome::Settled { order, payment, credit })
    }

    async fn fail_payment(
        &self,
        payment_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let payment = fetch_payment_or_fail(payment_id, &mut tx).await?;
        if payment.status != PaymentStatus::RequiresAction {
            debug!("💳 Payment #{payment_id} is already {}. Ignoring the failure.", payment.status);
            return Ok(FailureOutcome::Ignored(payment));
        }
        let payment = payments::mark_failed(payment_id, reason, now, &mut tx).await?;
        let order = fetch_order_or_fail(payment.order_id, &mut tx).await?;
        if order.status != OrderStatusType::PendingPayment {
            tx.commit().await?;
            return Ok(FailureOutcome::PaymentFailed(payment));
        }
        let items = orders::fetch_order_items(order.id, &mut tx).await?;
        stock::release_items(&items, now, &mut tx).await?;
        let order = orders::update_status(&order, OrderStatusType::Canceled, SYSTEM, now, &mut tx).await?;
        tx.commit().await?;
        info!("💳 Payment #{payment_id} failed ({reason}). Order #{} cancelled and stock released.", order.id);
        Ok(FailureOutcome::Released { order, payment })
    }

    async fn refund_payment(
        &self,
        payment_id: i64,
        refund_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let payment = fetch_payment_or_fail(payment_id, &mut tx).await?;
        match payment.status {
            PaymentStatus::Refunded => return Ok(RefundOutcome::AlreadyRefunded(payment)),
            PaymentStatus::Succeeded => {},
            _ => return Err(MarketplaceError::PaymentNotRefundable(payment_id)),
        }
        let payment = payments::mark_refunded(payment_id, refund_ref, now, &mut tx).await?;
        let mut order = fetch_order_or_fail(payment.order_id, &mut tx).await?;
        let previous = order.status;
        let note = format!("Refund {refund_ref} of payment #{payment_id}");
        let debit = ledger::insert_entry_if_absent(
            order.vendor_id,
            &payment,
            LedgerEntryType::Debit,
            payment.amount,
            &note,
            now,
            &mut tx,
        )
        .await?;
        if !order.status.is_terminal() && order.status != OrderStatusType::PendingPayment {
            order = orders::update_status(&order, OrderStatusType::Refunded, SYSTEM, now, &mut tx).await?;
        }
        tx.commit().await?;
        info!("↩️ Payment #{payment_id} refunded ({refund_ref}). Vendor {} debited {}", order.vendor_id, debit.amount);
        Ok(RefundOutcome::Refunded { payment, debit, order, previous })
    }

    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(payment_id, &mut conn).await?)
    }

    async fn fetch_payment_by_reference(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_by_reference(provider, reference, &mut conn).await?)
    }

    async fn fetch_latest_payment(
        &self,
        order_id: i64,
        provider: Option<PaymentProvider>,
    ) -> Result<Option<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_latest_payment(order_id, provider, &mut conn).await?)
    }

    async fn fetch_settled_payment(&self, order_id: i64) -> Result<Option<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_settled_payment(order_id, &mut conn).await?)
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payments_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_ledger_entries_for_order(&self, order_id: i64) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::fetch_entries_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_ledger_entries_for_vendor(&self, vendor_id: i64) -> Result<Vec<LedgerEntry>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::fetch_entries_for_vendor(vendor_id, &mut conn).await?)
    }
}

//--------------------------------------   ReturnManagement    ---------------------------------------------------------
fn ensure_return_status(
    request: &ReturnRequest,
    from: ReturnStatus,
    to: ReturnStatus,
) -> Result<(), MarketplaceError> {
    if request.status == from {
        Ok(())
    } else {
        Err(MarketplaceError::InvalidReturnTransition { from: request.status, to })
    }
}

/// Returns are handled by the order's vendor or an operator.
fn ensure_return_handler(actor: &Actor, vendor_owner: &str) -> Result<(), MarketplaceError> {
    match actor {
        Actor::Vendor(id) if id == vendor_owner => Ok(()),
        Actor::Operator(_) | Actor::System => Ok(()),
        _ => Err(MarketplaceError::Forbidden(format!("{actor} may not handle this return"))),
    }
}

impl ReturnManagement for SqliteDatabase {
    async fn open_return(
        &self,
        order_id: i64,
        customer_id: &str,
        reason: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let order = fetch_order_or_fail(order_id, &mut tx).await?;
        if order.customer_id != customer_id {
            return Err(MarketplaceError::Forbidden(format!("{customer_id} did not place order {order_id}")));
        }
        if !matches!(order.status, OrderStatusType::Delivered | OrderStatusType::PickedUp) {
            return Err(MarketplaceError::ReturnNotAllowed(order.status));
        }
        if returns::fetch_open_return(order_id, &mut tx).await?.is_some() {
            return Err(MarketplaceError::ReturnAlreadyOpen(order_id));
        }
        // The order was last touched when it was delivered or picked up
        if now - order.updated_at > Duration::days(window_days) {
            return Err(MarketplaceError::ReturnWindowExpired(window_days));
        }
        let request = returns::insert_return(&order, reason, now, &mut tx).await?;
        let actor = Actor::Customer(customer_id.to_string()).label();
        let order = orders::update_status(&order, OrderStatusType::ReturnRequested, &actor, now, &mut tx).await?;
        let vendor_owner = catalog::vendor_owner(order.vendor_id, &mut tx).await?;
        tx.commit().await?;
        info!("↩️ Return #{} opened for order #{order_id}", request.id);
        Ok(ReturnOutcome { request, previous: None, order, vendor_owner })
    }

    async fn review_return(
        &self,
        return_id: i64,
        actor: &Actor,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let request = fetch_return_or_fail(return_id, &mut tx).await?;
        let order = fetch_order_or_fail(request.order_id, &mut tx).await?;
        let vendor_owner = catalog::vendor_owner(order.vendor_id, &mut tx).await?;
        ensure_return_handler(actor, &vendor_owner)?;
        let (to, order_status) = if approve {
            (ReturnStatus::Approved, OrderStatusType::ReturnApproved)
        } else {
            (ReturnStatus::Rejected, completed_status(order.fulfillment))
        };
        ensure_return_status(&request, ReturnStatus::Requested, to)?;
        let request = returns::update_status(return_id, to, now, &mut tx).await?;
        let order = orders::update_status(&order, order_status, &actor.label(), now, &mut tx).await?;
        tx.commit().await?;
        info!("↩️ Return #{return_id} {} by {actor}", to.as_str().to_lowercase());
        Ok(ReturnOutcome { request, previous: Some(ReturnStatus::Requested), order, vendor_owner })
    }

    async fn receive_return(
        &self,
        return_id: i64,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let request = fetch_return_or_fail(return_id, &mut tx).await?;
        let order = fetch_order_or_fail(request.order_id, &mut tx).await?;
        let vendor_owner = catalog::vendor_owner(order.vendor_id, &mut tx).await?;
        ensure_return_handler(actor, &vendor_owner)?;
        ensure_return_status(&request, ReturnStatus::Approved, ReturnStatus::Received)?;
        let request = returns::update_status(return_id, ReturnStatus::Received, now, &mut tx).await?;
        let order = orders::update_status(&order, OrderStatusType::Returned, &actor.label(), now, &mut tx).await?;
        tx.commit().await?;
        info!("↩️ Goods for return #{return_id} received by {actor}");
        Ok(ReturnOutcome { request, previous: Some(ReturnStatus::Approved), order, vendor_owner })
    }

    async fn complete_return_refund(
        &self,
        return_id: i64,
        amount: MinorUnits,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError> {
        let mut tx = self.begin().await?;
        let request = fetch_return_or_fail(return_id, &mut tx).await?;
        ensure_return_status(&request, ReturnStatus::Received, ReturnStatus::Refunded)?;
        let mut order = fetch_order_or_fail(request.order_id, &mut tx).await?;
        if !amount.is_positive() || amount > order.total {
            return Err(MarketplaceError::ValidationError(format!(
                "A refund of {amount} is outside the order total of {}",
                order.total
            )));
        }
        let request = returns::mark_refunded(return_id, amount, reference, now, &mut tx).await?;
        if order.status == OrderStatusType::Returned {
            order = orders::update_status(&order, OrderStatusType::Refunded, SYSTEM, now, &mut tx).await?;
        }
        let vendor_owner = catalog::vendor_owner(order.vendor_id, &mut tx).await?;
        tx.commit().await?;
        info!("↩️ Return #{return_id} refunded {amount} {} ({reference})", order.currency);
        Ok(ReturnOutcome { request, previous: Some(ReturnStatus::Received), order, vendor_owner })
    }

    async fn fetch_return(&self, return_id: i64) -> Result<Option<ReturnRequest>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::fetch_return(return_id, &mut conn).await?)
    }

    async fn fetch_open_return_for_order(&self, order_id: i64) -> Result<Option<ReturnRequest>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(returns::fetch_open_return(order_id, &mut conn).await?)
    }
}

//--------------------------------------   PayoutManagement    ---------------------------------------------------------
impl PayoutManagement for SqliteDatabase {
    async fn fetch_payout_batch(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<PayoutBatch>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_batch(period_start, period_end, &mut conn).await?)
    }

    /// Creates the batch for the period, or returns the existing one untouched.
    async fn create_payout_batch(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PayoutBatchResult, MarketplaceError> {
        if period_start >= period_end {
            return Err(MarketplaceError::InvalidPayoutPeriod(format!("{period_start} is not before {period_end}")));
        }
        let mut tx = self.begin().await?;
        if let Some(batch) = payouts::fetch_batch(period_start, period_end, &mut tx).await? {
            let items = payouts::fetch_items(batch.id, &mut tx).await?;
            debug!("💰 Payout batch #{} already exists for {period_start} - {period_end}", batch.id);
            return Ok(PayoutBatchResult { batch, items, created: false });
        }
        let totals = payouts::ledger_totals(period_start, period_end, &mut tx).await?;
        let batch = payouts::insert_batch(period_start, period_end, now, &mut tx).await?;
        let mut items = Vec::with_capacity(totals.len());
        for vendor_totals in &totals {
            items.push(payouts::insert_item(batch.id, vendor_totals, &mut tx).await?);
        }
        tx.commit().await?;
        info!("💰 Payout batch #{} created with {} items", batch.id, items.len());
        Ok(PayoutBatchResult { batch, items, created: true })
    }

    async fn fetch_payout_items(&self, batch_id: i64) -> Result<Vec<PayoutItem>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_items(batch_id, &mut conn).await?)
    }
}

//--------------------------------------  CatalogManagement    ---------------------------------------------------------
impl CatalogManagement for SqliteDatabase {
    async fn create_vendor_application(
        &self,
        vendor: NewVendor,
        now: DateTime<Utc>,
    ) -> Result<Vendor, MarketplaceError> {
        let mut tx = self.begin().await?;
        let owner = vendor.owner_user_id.clone();
        let vendor = match catalog::insert_vendor(vendor, now, &mut tx).await {
            Err(MarketplaceError::UniqueViolation(_)) => Err(MarketplaceError::VendorApplicationExists(owner)),
            result => result,
        }?;
        tx.commit().await?;
        Ok(vendor)
    }

    async fn set_vendor_status(
        &self,
        vendor_id: i64,
        status: VendorStatus,
        now: DateTime<Utc>,
    ) -> Result<Vendor, MarketplaceError> {
        let mut tx = self.begin().await?;
        let vendor = catalog::update_vendor_status(vendor_id, status, now, &mut tx)
            .await?
            .ok_or(MarketplaceError::VendorNotFound(vendor_id))?;
        tx.commit().await?;
        Ok(vendor)
    }

    async fn fetch_vendor(&self, vendor_id: i64) -> Result<Option<Vendor>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_vendor(vendor_id, &mut conn).await?)
    }

    async fn create_product(&self, product: NewProduct, now: DateTime<Utc>) -> Result<Product, MarketplaceError> {
        let mut tx = self.begin().await?;
        if catalog::fetch_vendor(product.vendor_id, &mut tx).await?.is_none() {
            return Err(MarketplaceError::VendorNotFound(product.vendor_id));
        }
        let product = catalog::insert_product(product, now, &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn create_variant(
        &self,
        variant: NewVariant,
        now: DateTime<Utc>,
    ) -> Result<ProductVariant, MarketplaceError> {
        if variant.price.is_negative() || variant.stock_qty < 0 {
            return Err(MarketplaceError::ValidationError("Prices and stock cannot be negative".into()));
        }
        let mut tx = self.begin().await?;
        if catalog::fetch_product(variant.product_id, &mut tx).await?.is_none() {
            return Err(MarketplaceError::ProductNotFound(variant.product_id));
        }
        let variant = catalog::insert_variant(variant, now, &mut tx).await?;
        tx.commit().await?;
        Ok(variant)
    }

    async fn fetch_variant(&self, variant_id: i64) -> Result<Option<ProductVariant>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(catalog::fetch_variant(variant_id, &mut conn).await?)
    }

    async fn restock_variant(
        &self,
        variant_id: i64,
        qty: i64,
        now: DateTime<Utc>,
    ) -> Result<ProductVariant, MarketplaceError> {
        let mut tx = self.begin().await?;
        let variant =
            stock::restock(variant_id, qty, now, &mut tx).await?.ok_or(MarketplaceError::VariantNotFound(variant_id))?;
        tx.commit().await?;
        Ok(variant)
    }

    async fn add_shipping_rate(
        &self,
        rate: NewShippingRate,
        now: DateTime<Utc>,
    ) -> Result<ShippingRate, MarketplaceError> {
        if rate.fee.is_negative() {
            return Err(MarketplaceError::ValidationError("Shipping fees cannot be negative".into()));
        }
        let mut tx = self.begin().await?;
        let rate = catalog::insert_shipping_rate(rate, now, &mut tx).await?;
        tx.commit().await?;
        Ok(rate)
    }

    async fn add_address(&self, address: NewAddress, now: DateTime<Utc>) -> Result<Address, MarketplaceError> {
        let mut tx = self.begin().await?;
        let address = catalog::insert_address(address, now, &mut tx).await?;
        tx.commit().await?;
        Ok(address)
    }

    async fn add_pickup_location(
        &self,
        vendor_id: i64,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<PickupLocation, MarketplaceError> {
        let mut tx = self.begin().await?;
        if catalog::fetch_vendor(vendor_id, &mut tx).await?.is_none() {
            return Err(MarketplaceError::VendorNotFound(vendor_id));
        }
        let location = catalog::insert_pickup_location(vendor_id, name, now, &mut tx).await?;
        tx.commit().await?;
        Ok(location)
    }

    async fn add_to_cart(
        &self,
        customer_id: &str,
        variant_id: i64,
        qty: i64,
        now: DateTime<Utc>,
    ) -> Result<Cart, MarketplaceError> {
        let mut tx = self.begin().await?;
        let cart = catalog::add_cart_item(customer_id, variant_id, qty, now, &mut tx).await?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn fetch_cart_items(&self, customer_id: &str) -> Result<Vec<CartItem>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        match catalog::fetch_cart(customer_id, &mut conn).await? {
            Some(cart) => Ok(catalog::fetch_cart_items(cart.id, &mut conn).await?),
            None => Ok(Vec::new()),
        }
    }
}

//--------------------------------------       JobQueue        ---------------------------------------------------------
impl JobQueue for SqliteDatabase {
    async fn enqueue_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<EnqueueResult, MarketplaceError> {
        let mut tx = self.begin().await?;
        let result = jobs::enqueue(job, now, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lock_for: StdDuration,
    ) -> Result<Vec<Job>, MarketplaceError> {
        let mut tx = self.begin().await?;
        let claimed = jobs::claim_due(now, limit, lock_for, &mut tx).await?;
        tx.commit().await?;
        Ok(claimed)
    }

    async fn complete_job(&self, job_id: i64, now: DateTime<Utc>) -> Result<(), MarketplaceError> {
        let mut tx = self.begin().await?;
        jobs::mark_done(job_id, now, &mut tx).await?;
        Ok(tx.commit().await?)
    }

    async fn retry_job(
        &self,
        job_id: i64,
        run_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MarketplaceError> {
        let mut tx = self.begin().await?;
        jobs::requeue(job_id, run_at, error, now, &mut tx).await?;
        Ok(tx.commit().await?)
    }

    async fn bury_job(&self, job_id: i64, error: &str, now: DateTime<Utc>) -> Result<(), MarketplaceError> {
        let mut tx = self.begin().await?;
        jobs::mark_dead(job_id, error, now, &mut tx).await?;
        Ok(tx.commit().await?)
    }

    async fn fetch_job(&self, job_id: i64) -> Result<Option<Job>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(jobs::fetch_job(job_id, &mut conn).await?)
    }

    async fn fetch_job_by_key(&self, key: &str) -> Result<Option<Job>, MarketplaceError> {
        let mut conn = self.pool.acquire().await?;
        Ok(jobs::fetch_latest_job_by_key(key, &mut conn).await?)
    }
}
