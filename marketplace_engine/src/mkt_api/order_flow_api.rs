use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Actor, OrderStatusType},
    events::{builders, EffectDispatcher, EventProducers},
    mkt_api::{errors::MarketplaceError, vendor_owner},
    traits::{
        data_objects::{ExpiryOutcome, TransitionOutcome},
        MarketplaceDatabase,
    },
};

/// `OrderFlowApi` moves orders through their lifecycle on behalf of customers, vendors, operators and workers.
pub struct OrderFlowApi<B> {
    db: B,
    dispatcher: EffectDispatcher<B>,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let dispatcher = EffectDispatcher::new(db.clone(), producers);
        Self { db, dispatcher }
    }
}

impl<B: MarketplaceDatabase> OrderFlowApi<B> {
    /// Requests a status change.
    ///
    /// Requesting the order's current status succeeds without side effects (`applied == false`). Transitions outside
    /// the order table, or not permitted for the actor, are rejected. Applied transitions notify the order's other
    /// participant(s).
    pub async fn update_status(
        &self,
        order_id: i64,
        to: OrderStatusType,
        actor: &Actor,
    ) -> Result<TransitionOutcome, MarketplaceError> {
        let outcome = self.db.transition_order(order_id, to, actor, Utc::now()).await?;
        if outcome.applied {
            let effects = builders::order_transitioned(&outcome.order, outcome.previous, &outcome.vendor_owner, actor);
            self.dispatcher.dispatch(effects).await;
        }
        Ok(outcome)
    }

    /// Cancels the order and releases its reservation if it is still unpaid after `payment_expires_at`. Safe to run
    /// any number of times.
    pub async fn expire_reservation(&self, order_id: i64) -> Result<ExpiryOutcome, MarketplaceError> {
        let outcome = self.db.expire_reservation(order_id, Utc::now()).await?;
        match &outcome {
            ExpiryOutcome::Expired(order) => {
                let owner = vendor_owner(&self.db, order).await?;
                let effects =
                    builders::order_transitioned(order, OrderStatusType::PendingPayment, &owner, &Actor::System);
                self.dispatcher.dispatch(effects).await;
            },
            other => debug!("🕰️ Reservation expiry for order #{order_id} had nothing to do: {other:?}"),
        }
        Ok(outcome)
    }

    /// Expires every overdue reservation, up to `limit` orders. This catches orders whose expiry job was never
    /// scheduled. Returns the ids of the orders that were cancelled.
    pub async fn sweep_expired_reservations(&self, limit: i64) -> Result<Vec<i64>, MarketplaceError> {
        let due = self.db.fetch_expired_pending_orders(Utc::now(), limit).await?;
        let mut expired = Vec::with_capacity(due.len());
        for order_id in due {
            match self.expire_reservation(order_id).await {
                Ok(outcome) if outcome.expired() => expired.push(order_id),
                Ok(_) => {},
                Err(e) => warn!("🕰️ Could not expire the reservation for order #{order_id}. {e}"),
            }
        }
        if !expired.is_empty() {
            info!("🕰️ Expiry sweep cancelled {} overdue orders", expired.len());
        }
        Ok(expired)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
