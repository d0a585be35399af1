use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::MarketplaceConfig,
    db_types::{Actor, ReturnStatus},
    events::{builders, EffectDispatcher, EventProducers},
    mkt_api::{errors::MarketplaceError, payment_api::PaymentApi, payment_objects::RefundResult},
    traits::{data_objects::ReturnOutcome, CardNetworkClient, MarketplaceDatabase},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRefund {
    pub outcome: ReturnOutcome,
    pub refund: RefundResult,
}

/// `ReturnsApi` runs the return workflow: REQUESTED → APPROVED → RECEIVED → REFUNDED, or REQUESTED → REJECTED.
///
/// A refund for a delivered order can only be issued once the vendor has received the goods back.
pub struct ReturnsApi<B, C> {
    db: B,
    payments: PaymentApi<B, C>,
    config: MarketplaceConfig,
    dispatcher: EffectDispatcher<B>,
}

impl<B, C> Debug for ReturnsApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReturnsApi")
    }
}

impl<B: Clone, C> ReturnsApi<B, C> {
    pub fn new(db: B, payments: PaymentApi<B, C>, config: MarketplaceConfig, producers: EventProducers) -> Self {
        let dispatcher = EffectDispatcher::new(db.clone(), producers);
        Self { db, payments, config, dispatcher }
    }
}

impl<B, C> ReturnsApi<B, C>
where
    B: MarketplaceDatabase,
    C: CardNetworkClient,
{
    async fn notify(&self, outcome: &ReturnOutcome, actor: &Actor) {
        let effects = builders::return_updated(&outcome.request, &outcome.order, &outcome.vendor_owner, actor);
        self.dispatcher.dispatch(effects).await;
    }

    /// Opens a return for a delivered or picked-up order, within the return window.
    pub async fn request_return(
        &self,
        order_id: i64,
        customer_id: &str,
        reason: &str,
    ) -> Result<ReturnOutcome, MarketplaceError> {
        let window = self.config.return_window_days;
        let outcome = self.db.open_return(order_id, customer_id, reason, window, Utc::now()).await?;
        self.notify(&outcome, &Actor::Customer(customer_id.to_string())).await;
        Ok(outcome)
    }

    pub async fn approve_return(&self, return_id: i64, actor: &Actor) -> Result<ReturnOutcome, MarketplaceError> {
        let outcome = self.db.review_return(return_id, actor, true, Utc::now()).await?;
        self.notify(&outcome, actor).await;
        Ok(outcome)
    }

    /// Rejects the return. The order goes back to DELIVERED or PICKED_UP.
    pub async fn reject_return(&self, return_id: i64, actor: &Actor) -> Result<ReturnOutcome, MarketplaceError> {
        let outcome = self.db.review_return(return_id, actor, false, Utc::now()).await?;
        self.notify(&outcome, actor).await;
        Ok(outcome)
    }

    pub async fn receive_return(&self, return_id: i64, actor: &Actor) -> Result<ReturnOutcome, MarketplaceError> {
        let outcome = self.db.receive_return(return_id, actor, Utc::now()).await?;
        self.notify(&outcome, actor).await;
        Ok(outcome)
    }

    /// Refunds a RECEIVED return through the order's payment provider, then closes the return as REFUNDED.
    ///
    /// Calling this again after a partial failure is safe: an already refunded payment is not refunded twice.
    pub async fn issue_refund(&self, return_id: i64, actor: &Actor) -> Result<ReturnRefund, MarketplaceError> {
        let request = self.db.fetch_return(return_id).await?.ok_or(MarketplaceError::ReturnNotFound(return_id))?;
        if request.status != ReturnStatus::Received {
            return Err(MarketplaceError::InvalidReturnTransition { from: request.status, to: ReturnStatus::Refunded });
        }
        let refund = self.payments.refund_order(request.order_id, actor).await?;
        let outcome =
            self.db.complete_return_refund(return_id, refund.payment.amount, &refund.reference, Utc::now()).await?;
        info!("↩️ Return #{return_id} for order #{} is refunded", request.order_id);
        self.notify(&outcome, actor).await;
        Ok(ReturnRefund { outcome, refund })
    }
}
