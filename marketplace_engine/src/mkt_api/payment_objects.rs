use serde::{Deserialize, Serialize};

use crate::db_types::{Order, Payment};

/// A card checkout that is waiting for the customer on the provider's hosted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCheckout {
    pub payment: Payment,
    pub session_id: String,
    pub url: Option<String>,
}

/// The result of a synchronous (mobile money) payment or callback. `duplicate` is true when the order had already been
/// paid through this provider and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyResult {
    pub payment: Payment,
    pub order: Order,
    pub duplicate: bool,
}

/// A signed mobile money callback, after the server has checked its HMAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyCallback {
    pub reference: String,
    pub succeeded: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Settled,
    AlreadyProcessed,
    /// The order was cancelled before the payment arrived. An operator must refund it.
    LateForCancelledOrder,
    /// The order was already paid by another payment, which has been marked failed.
    DuplicatePayment,
    PaymentFailed,
    Refunded,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub action: WebhookAction,
    pub payment_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub payment: Payment,
    /// The provider's refund reference.
    pub reference: String,
    /// True when the payment had already been refunded and the stored result is returned.
    pub duplicate: bool,
}
