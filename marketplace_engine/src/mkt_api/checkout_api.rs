use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    checkout::CheckoutRequest,
    config::MarketplaceConfig,
    db_types::Cart,
    events::{builders, EffectDispatcher, EventProducers},
    mkt_api::errors::MarketplaceError,
    traits::{data_objects::PlacedOrder, DiscountResolver, MarketplaceDatabase, NoDiscounts},
};

/// `CheckoutApi` turns carts into orders.
pub struct CheckoutApi<B, D = NoDiscounts> {
    db: B,
    discounts: D,
    config: MarketplaceConfig,
    dispatcher: EffectDispatcher<B>,
}

impl<B, D> Debug for CheckoutApi<B, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B: Clone> CheckoutApi<B, NoDiscounts> {
    pub fn new(db: B, producers: EventProducers, config: MarketplaceConfig) -> Self {
        let dispatcher = EffectDispatcher::new(db.clone(), producers);
        Self { db, discounts: NoDiscounts, config, dispatcher }
    }
}

impl<B, D> CheckoutApi<B, D> {
    /// Replaces the promotion resolver.
    pub fn with_discounts<D2: DiscountResolver>(self, discounts: D2) -> CheckoutApi<B, D2> {
        CheckoutApi { db: self.db, discounts, config: self.config, dispatcher: self.dispatcher }
    }
}

impl<B, D> CheckoutApi<B, D>
where
    B: MarketplaceDatabase,
    D: DiscountResolver,
{
    pub async fn add_to_cart(&self, customer_id: &str, variant_id: i64, qty: i64) -> Result<Cart, MarketplaceError> {
        self.db.add_to_cart(customer_id, variant_id, qty, Utc::now()).await
    }

    /// Places an order for the customer's cart.
    ///
    /// On success the order is PENDING_PAYMENT, its stock is reserved until `payment_expires_at` and the cart is
    /// empty. The reservation expiry job is scheduled and both parties are notified after the order has been
    /// committed. Any failure leaves the cart and stock untouched.
    pub async fn checkout(&self, request: &CheckoutRequest) -> Result<PlacedOrder, MarketplaceError> {
        let window = chrono::Duration::from_std(self.config.reservation_window)
            .map_err(|e| MarketplaceError::InternalError(format!("Invalid reservation window. {e}")))?;
        let placed = self.db.place_order(request, &self.discounts, window, Utc::now()).await.map_err(|e| {
            debug!("🛒 Checkout for {} failed. {e}", request.customer_id);
            e
        })?;
        let max_attempts = self.config.retry_policy.max_attempts;
        let effects = builders::order_placed(&placed.order, &placed.vendor_owner, max_attempts);
        self.dispatcher.dispatch(effects).await;
        Ok(placed)
    }
}
