use std::collections::HashMap;

use card_network_tools::{
    webhook::{self, WebhookEvent},
    CheckoutLineItem,
    CheckoutSession,
    NewCheckoutSession,
    NewRefund,
    RefundTarget,
};
use chrono::Utc;
use log::*;
use mkt_common::Secret;

use crate::{
    checkout::verify_order_total,
    db_types::{Order, OrderItem, Payment},
    mkt_api::errors::MarketplaceError,
    providers::reference::ProviderReference,
    traits::CardNetworkClient,
};

pub const ORDER_ID_KEY: &str = "order_id";
pub const PAYMENT_ID_KEY: &str = "payment_id";

/// The asynchronous card network: hosted checkout sessions, confirmed later by a signed webhook.
#[derive(Clone)]
pub struct CardNetworkGateway<C> {
    client: C,
    success_url: String,
    cancel_url: String,
    webhook_secret: Secret<String>,
    tolerance_secs: i64,
}

impl<C> CardNetworkGateway<C> {
    pub fn new(
        client: C,
        success_url: &str,
        cancel_url: &str,
        webhook_secret: Secret<String>,
        tolerance_secs: i64,
    ) -> Self {
        Self {
            client,
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            webhook_secret,
            tolerance_secs,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Checks the signature header against the raw body and parses the event. Nothing is read or written locally.
    pub fn verify_and_parse_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, MarketplaceError> {
        let now = Utc::now().timestamp();
        let secret = self.webhook_secret.reveal();
        let event = webhook::verify_and_parse(secret, signature, payload, self.tolerance_secs, now)?;
        trace!("💳 Verified card network event {}", event.event_id());
        Ok(event)
    }
}

/// Builds the session request from the order's price snapshots.
pub fn new_checkout_session(
    order: &Order,
    items: &[OrderItem],
    payment: &Payment,
    success_url: &str,
    cancel_url: &str,
) -> NewCheckoutSession {
    let line_items = items
        .iter()
        .map(|i| CheckoutLineItem { name: i.title.clone(), unit_amount: i.unit_price, quantity: i.qty })
        .collect();
    let metadata = HashMap::from([
        (ORDER_ID_KEY.to_string(), order.id.to_string()),
        (PAYMENT_ID_KEY.to_string(), payment.id.to_string()),
    ]);
    NewCheckoutSession {
        currency: order.currency.clone(),
        line_items,
        shipping_amount: order.shipping_fee,
        tax_amount: order.tax_amount,
        discount_amount: order.discount_amount,
        success_url: success_url.to_string(),
        cancel_url: cancel_url.to_string(),
        metadata,
    }
}

impl<C: CardNetworkClient> CardNetworkGateway<C> {
    /// Opens a hosted checkout session for the order. The order total is re-verified against the item snapshots first,
    /// and the session request itself must add up to the same total.
    pub async fn create_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        payment: &Payment,
    ) -> Result<CheckoutSession, MarketplaceError> {
        verify_order_total(order, items)?;
        let session = new_checkout_session(order, items, payment, &self.success_url, &self.cancel_url);
        let computed = session.line_items_total();
        if computed != order.total {
            return Err(MarketplaceError::TotalMismatch { stored: order.total, computed });
        }
        let session = self.client.create_checkout_session(&session).await?;
        debug!("💳 Checkout session {} opened for order #{}", session.id, order.id);
        Ok(session)
    }

    /// Refunds the full payment, routed by the shape of its stored reference.
    pub async fn issue_refund(&self, payment: &Payment) -> Result<String, MarketplaceError> {
        let reference = payment
            .provider_ref
            .as_deref()
            .ok_or_else(|| MarketplaceError::UnrecognizedReference(format!("payment #{} has none", payment.id)))?;
        let target = match ProviderReference::classify(reference)? {
            ProviderReference::PaymentIntent(pi) => RefundTarget::PaymentIntent(pi.to_string()),
            ProviderReference::Charge(ch) => RefundTarget::Charge(ch.to_string()),
            ProviderReference::CheckoutSession(cs) => {
                let session = self.client.retrieve_checkout_session(cs).await?;
                let pi = session.payment_intent.ok_or_else(|| {
                    MarketplaceError::ProviderError(format!("Checkout session {cs} has no payment intent"))
                })?;
                debug!("💳 Checkout session {cs} resolved to payment intent {pi}");
                RefundTarget::PaymentIntent(pi)
            },
            ProviderReference::MobileMoney { .. } => {
                return Err(MarketplaceError::UnrecognizedReference(reference.to_string()));
            },
        };
        let refund = NewRefund::new(target)
            .with_amount(payment.amount)
            .with_metadata(ORDER_ID_KEY, payment.order_id.to_string())
            .with_metadata(PAYMENT_ID_KEY, payment.id.to_string());
        debug!("💳 Refunding {} {} against {}", payment.amount, payment.currency, refund.target_description());
        let refund = self.client.create_refund(&refund).await?;
        Ok(refund.id)
    }
}
