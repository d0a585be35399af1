use std::{fmt::Debug, sync::Arc};

use card_network_tools::webhook::WebhookEvent;
use chrono::Utc;
use log::*;

use crate::{
    checkout::verify_order_total,
    db_types::{Actor, NewPayment, Order, OrderItem, OrderStatusType, Payment, PaymentProvider, PaymentStatus},
    events::{builders, EffectDispatcher, EventProducers, PendingEffect},
    mkt_api::{
        errors::MarketplaceError,
        payment_objects::{
            CardCheckout,
            MobileMoneyCallback,
            MobileMoneyResult,
            RefundResult,
            WebhookAction,
            WebhookReceipt,
        },
        vendor_owner,
    },
    providers::{CheckoutStart, Gateway, PaymentGateways, ORDER_ID_KEY, PAYMENT_ID_KEY},
    traits::{
        data_objects::{FailureOutcome, RefundOutcome, SettlementOutcome},
        CardNetworkClient,
        MarketplaceDatabase,
    },
};

/// `PaymentApi` starts payments, applies provider confirmations and issues refunds.
///
/// Every confirmation goes through the same guarded routines in the backend, so replayed webhooks, retried callbacks
/// and racing confirmations settle an order at most once.
pub struct PaymentApi<B, C> {
    db: B,
    gateways: Arc<PaymentGateways<C>>,
    dispatcher: EffectDispatcher<B>,
}

impl<B, C> Debug for PaymentApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi")
    }
}

impl<B: Clone, C> Clone for PaymentApi<B, C> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), gateways: Arc::clone(&self.gateways), dispatcher: self.dispatcher.clone() }
    }
}

impl<B: Clone, C> PaymentApi<B, C> {
    pub fn new(db: B, gateways: Arc<PaymentGateways<C>>, producers: EventProducers) -> Self {
        let dispatcher = EffectDispatcher::new(db.clone(), producers);
        Self { db, gateways, dispatcher }
    }

    pub fn gateways(&self) -> &PaymentGateways<C> {
        &self.gateways
    }
}

impl<B, C> PaymentApi<B, C>
where
    B: MarketplaceDatabase,
    C: CardNetworkClient,
{
    /// Loads an order the customer may pay for right now, with its items.
    async fn payable_order(
        &self,
        order_id: i64,
        customer_id: &str,
    ) -> Result<(Order, Vec<OrderItem>), MarketplaceError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        if order.customer_id != customer_id {
            return Err(MarketplaceError::Forbidden(format!("{customer_id} did not place order {order_id}")));
        }
        if order.status != OrderStatusType::PendingPayment {
            return Err(MarketplaceError::OrderNotPayable(order_id));
        }
        let items = self.db.fetch_order_items(order_id).await?;
        verify_order_total(&order, &items)?;
        Ok((order, items))
    }

    fn new_payment(order: &Order, provider: PaymentProvider, provider_ref: Option<String>) -> NewPayment {
        NewPayment {
            order_id: order.id,
            provider,
            provider_ref,
            amount: order.total,
            currency: order.currency.clone(),
            created_at: Utc::now(),
        }
    }

    //--------------------------------------   Card network    ---------------------------------------------------------

    /// Opens a hosted card checkout for a PENDING_PAYMENT order.
    ///
    /// The order total is re-verified against its price snapshots before anything is sent to the provider. The
    /// payment stays REQUIRES_ACTION until the webhook arrives.
    pub async fn start_card_checkout(
        &self,
        order_id: i64,
        customer_id: &str,
    ) -> Result<CardCheckout, MarketplaceError> {
        let gateway = self.gateways.gateway(PaymentProvider::CardNetwork)?;
        let (order, items) = self.payable_order(order_id, customer_id).await?;
        let payment = self.db.insert_payment(Self::new_payment(&order, PaymentProvider::CardNetwork, None)).await?;
        match gateway.create_checkout(&order, &items, &payment).await? {
            CheckoutStart::Redirect { session_id, url } => {
                let payment = self.db.attach_provider_reference(payment.id, &session_id, Utc::now()).await?;
                info!("💳 Card checkout {session_id} started for order #{order_id}");
                Ok(CardCheckout { payment, session_id, url })
            },
            CheckoutStart::Confirmed { .. } => {
                Err(MarketplaceError::InternalError("The card network confirmed a checkout synchronously".into()))
            },
        }
    }

    /// Verifies and applies a card network webhook. Signature problems are rejected before anything is read.
    pub async fn handle_card_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookReceipt, MarketplaceError> {
        let event = self.gateways.card_network()?.verify_and_parse_webhook(payload, signature)?;
        let event_id = event.event_id().to_string();
        let (action, payment_id) = match &event {
            WebhookEvent::SessionCompleted(e) => {
                let payment = self.resolve_card_payment(Some(&e.session_id), &e.metadata).await?;
                let outcome = self.db.settle_payment(payment.id, None, Utc::now()).await?;
                let action = match &outcome {
                    SettlementOutcome::Settled { .. } => WebhookAction::Settled,
                    SettlementOutcome::AlreadySettled(_) => WebhookAction::AlreadyProcessed,
                    SettlementOutcome::LateForCancelledOrder { .. } => WebhookAction::LateForCancelledOrder,
                    SettlementOutcome::OrderAlreadyPaid { .. } => WebhookAction::DuplicatePayment,
                };
                self.after_settlement(&outcome).await;
                (action, Some(payment.id))
            },
            WebhookEvent::PaymentFailed(e) => {
                let payment = self.resolve_card_payment(Some(&e.payment_intent), &e.metadata).await?;
                let reason = e.failure_message.as_deref().unwrap_or("The card payment failed");
                let outcome = self.db.fail_payment(payment.id, reason, Utc::now()).await?;
                let action = match &outcome {
                    FailureOutcome::Ignored(_) => WebhookAction::AlreadyProcessed,
                    _ => WebhookAction::PaymentFailed,
                };
                self.after_failure(&outcome, reason).await;
                (action, Some(payment.id))
            },
            WebhookEvent::ChargeRefunded(e) => {
                let payment = self.resolve_card_payment(e.payment_intent.as_deref(), &e.metadata).await?;
                let outcome = self.apply_refund(&payment, &e.charge_id).await?;
                let action = match outcome {
                    RefundOutcome::AlreadyRefunded(_) => WebhookAction::AlreadyProcessed,
                    RefundOutcome::Refunded { .. } => WebhookAction::Refunded,
                };
                (action, Some(payment.id))
            },
            WebhookEvent::Ignored { event_type, .. } => {
                debug!("💳 Card network event {event_id} ({event_type}) needs no action");
                (WebhookAction::Ignored, None)
            },
        };
        debug!("💳 Card network event {event_id} handled: {action:?}");
        Ok(WebhookReceipt { event_id, action, payment_id })
    }

    /// Finds the payment a webhook refers to: by provider reference first, then the latest card payment of the order
    /// named in the event metadata.
    async fn resolve_card_payment(
        &self,
        reference: Option<&str>,
        metadata: &std::collections::HashMap<String, String>,
    ) -> Result<Payment, MarketplaceError> {
        if let Some(reference) = reference {
            if let Some(p) = self.db.fetch_payment_by_reference(PaymentProvider::CardNetwork, reference).await? {
                return Ok(p);
            }
        }
        if let Some(payment_id) = metadata.get(PAYMENT_ID_KEY).and_then(|id| id.parse::<i64>().ok()) {
            if let Some(p) = self.db.fetch_payment(payment_id).await? {
                if p.provider == PaymentProvider::CardNetwork {
                    return Ok(p);
                }
            }
        }
        if let Some(order_id) = metadata.get(ORDER_ID_KEY).and_then(|id| id.parse::<i64>().ok()) {
            if let Some(p) = self.db.fetch_latest_payment(order_id, Some(PaymentProvider::CardNetwork)).await? {
                return Ok(p);
            }
        }
        let description = reference.unwrap_or("<no reference>");
        warn!("💳 Card network event for {description} does not match any payment");
        Err(MarketplaceError::PaymentNotFound(description.to_string()))
    }

    //--------------------------------------   Mobile money    ---------------------------------------------------------

    /// Pays for a PENDING_PAYMENT order with a synchronous mobile money provider.
    ///
    /// A retry after the order has been paid through the same provider returns the existing payment with
    /// `duplicate: true` and changes nothing.
    pub async fn pay_with_mobile_money(
        &self,
        order_id: i64,
        customer_id: &str,
        provider: PaymentProvider,
    ) -> Result<MobileMoneyResult, MarketplaceError> {
        let gateway = self.gateways.gateway(provider)?;
        if !provider.is_synchronous() {
            return Err(MarketplaceError::ValidationError(format!("{provider} does not confirm payments in-process")));
        }
        if let Some(existing) = self.db.fetch_latest_payment(order_id, Some(provider)).await? {
            if existing.status == PaymentStatus::Succeeded {
                let order =
                    self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
                if order.customer_id != customer_id {
                    return Err(MarketplaceError::Forbidden(format!("{customer_id} did not place order {order_id}")));
                }
                debug!("💳 Order #{order_id} was already paid with {provider}. Returning payment #{}", existing.id);
                return Ok(MobileMoneyResult { payment: existing, order, duplicate: true });
            }
        }
        let (order, items) = self.payable_order(order_id, customer_id).await?;
        let reference = match gateway {
            Gateway::Sync(mm) => Some(mm.new_reference()),
            Gateway::Async(_) => None,
        };
        let payment = self.db.insert_payment(Self::new_payment(&order, provider, reference)).await?;
        let reference = match gateway.create_checkout(&order, &items, &payment).await? {
            CheckoutStart::Confirmed { reference } => reference,
            CheckoutStart::Redirect { .. } => {
                return Err(MarketplaceError::InternalError(format!("{provider} asked for a redirect")));
            },
        };
        self.apply_mobile_money_success(payment.id, &reference).await
    }

    /// Applies a callback from a mobile money provider. Callbacks for already-settled payments are reported as
    /// duplicates.
    pub async fn handle_mobile_money_callback(
        &self,
        provider: PaymentProvider,
        callback: &MobileMoneyCallback,
    ) -> Result<MobileMoneyResult, MarketplaceError> {
        self.gateways.gateway(provider)?;
        let payment = self
            .db
            .fetch_payment_by_reference(provider, &callback.reference)
            .await?
            .ok_or_else(|| MarketplaceError::PaymentNotFound(callback.reference.clone()))?;
        if callback.succeeded {
            return self.apply_mobile_money_success(payment.id, &callback.reference).await;
        }
        let reason = callback.reason.as_deref().unwrap_or("The mobile money payment failed");
        let outcome = self.db.fail_payment(payment.id, reason, Utc::now()).await?;
        self.after_failure(&outcome, reason).await;
        let duplicate = matches!(outcome, FailureOutcome::Ignored(_));
        let payment = match outcome {
            FailureOutcome::Released { payment, .. } |
            FailureOutcome::PaymentFailed(payment) |
            FailureOutcome::Ignored(payment) => payment,
        };
        let order =
            self.db.fetch_order(payment.order_id).await?.ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
        Ok(MobileMoneyResult { payment, order, duplicate })
    }

    async fn apply_mobile_money_success(
        &self,
        payment_id: i64,
        reference: &str,
    ) -> Result<MobileMoneyResult, MarketplaceError> {
        let outcome = self.db.settle_payment(payment_id, Some(reference), Utc::now()).await?;
        self.after_settlement(&outcome).await;
        let (payment, order, duplicate) = match outcome {
            SettlementOutcome::Settled { order, payment, .. } => (payment, order, false),
            SettlementOutcome::LateForCancelledOrder { order, payment } => (payment, order, false),
            SettlementOutcome::OrderAlreadyPaid { order, payment } => (payment, order, true),
            SettlementOutcome::AlreadySettled(payment) => {
                let order = self
                    .db
                    .fetch_order(payment.order_id)
                    .await?
                    .ok_or(MarketplaceError::OrderNotFound(payment.order_id))?;
                (payment, order, true)
            },
        };
        Ok(MobileMoneyResult { payment, order, duplicate })
    }

    //--------------------------------------      Refunds      ---------------------------------------------------------

    /// Refunds the order's settled payment in full.
    ///
    /// An already refunded payment returns its stored refund reference with `duplicate: true`. Otherwise the order must
    /// be RETURNED, or CANCELED after it was paid. The refund is routed to the provider by the shape of the stored
    /// reference, and on success the payment is marked REFUNDED, the vendor is debited once and a returned order
    /// becomes REFUNDED.
    pub async fn refund_order(&self, order_id: i64, actor: &Actor) -> Result<RefundResult, MarketplaceError> {
        if !matches!(actor, Actor::Operator(_) | Actor::System) {
            return Err(MarketplaceError::Forbidden(format!("{actor} may not issue refunds")));
        }
        let order = self.db.fetch_order(order_id).await?.ok_or(MarketplaceError::OrderNotFound(order_id))?;
        let Some(payment) = self.db.fetch_settled_payment(order_id).await? else {
            return match self.db.fetch_latest_payment(order_id, None).await? {
                Some(p) => Err(MarketplaceError::PaymentNotRefundable(p.id)),
                None => Err(MarketplaceError::PaymentNotFound(format!("order #{order_id}"))),
            };
        };
        if payment.status == PaymentStatus::Refunded {
            let reference = payment.refund_ref.clone().unwrap_or_default();
            debug!("↩️ Payment #{} for order #{order_id} was already refunded ({reference})", payment.id);
            return Ok(RefundResult { payment, reference, duplicate: true });
        }
        if !matches!(order.status, OrderStatusType::Returned | OrderStatusType::Canceled) {
            return Err(MarketplaceError::InvalidTransition { from: order.status, to: OrderStatusType::Refunded });
        }
        let reference = self.gateways.gateway(payment.provider)?.issue_refund(&payment).await?;
        info!("↩️ {} refunded payment #{} as {reference}", payment.provider, payment.id);
        match self.apply_refund(&payment, &reference).await? {
            RefundOutcome::Refunded { payment, .. } => Ok(RefundResult { payment, reference, duplicate: false }),
            // A refund webhook got there first
            RefundOutcome::AlreadyRefunded(payment) => {
                let reference = payment.refund_ref.clone().unwrap_or(reference);
                Ok(RefundResult { payment, reference, duplicate: true })
            },
        }
    }

    async fn apply_refund(&self, payment: &Payment, refund_ref: &str) -> Result<RefundOutcome, MarketplaceError> {
        let outcome = self.db.refund_payment(payment.id, refund_ref, Utc::now()).await?;
        if let RefundOutcome::Refunded { order, previous, .. } = &outcome {
            if order.status != *previous {
                let owner = vendor_owner(&self.db, order).await?;
                let effects = builders::order_transitioned(order, *previous, &owner, &Actor::System);
                self.dispatcher.dispatch(effects).await;
            }
        }
        Ok(outcome)
    }

    //--------------------------------------      Effects      ---------------------------------------------------------

    async fn after_settlement(&self, outcome: &SettlementOutcome) {
        let effects: Vec<PendingEffect> = match outcome {
            SettlementOutcome::Settled { order, .. } => match vendor_owner(&self.db, order).await {
                Ok(owner) => {
                    builders::order_transitioned(order, OrderStatusType::PendingPayment, &owner, &Actor::System)
                },
                Err(e) => {
                    warn!("💳 Order #{} is paid, but its participants could not be notified. {e}", order.id);
                    Vec::new()
                },
            },
            _ => Vec::new(),
        };
        self.dispatcher.dispatch(effects).await;
    }

    async fn after_failure(&self, outcome: &FailureOutcome, reason: &str) {
        if let FailureOutcome::Released { order, .. } = outcome {
            self.dispatcher.dispatch(builders::payment_failed(order, reason)).await;
        }
    }
}
