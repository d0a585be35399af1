//! Results returned by the backend traits. Each one carries enough context for the caller to build its post-commit
//! effects (notifications, realtime pushes, job scheduling).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    LedgerEntry,
    Order,
    OrderItem,
    OrderStatusLogEntry,
    OrderStatusType,
    Payment,
    PayoutBatch,
    PayoutItem,
    ReturnRequest,
    ReturnStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// User id of the vendor's owner.
    pub vendor_owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub order: Order,
    pub previous: OrderStatusType,
    pub vendor_owner: String,
    /// False when the order was already in the requested status.
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// The order was cancelled and its reservation released.
    Expired(Order),
    /// Paid or cancelled already. Nothing to do.
    NotPending(OrderStatusType),
    /// `payment_expires_at` is absent or still in the future.
    NotDue(Option<DateTime<Utc>>),
    OrderMissing,
}

impl ExpiryOutcome {
    pub fn expired(&self) -> bool {
        matches!(self, ExpiryOutcome::Expired(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The order is now PAID, its reservation consumed and the vendor credited.
    Settled { order: Order, payment: Payment, credit: LedgerEntry },
    /// The payment was already SUCCEEDED or REFUNDED. Nothing changed.
    AlreadySettled(Payment),
    /// The order had already been cancelled (usually by reservation expiry). The payment is recorded as SUCCEEDED but
    /// stock and the ledger are untouched. An operator must refund it.
    LateForCancelledOrder { order: Order, payment: Payment },
    /// Another payment already settled this order. This payment is marked FAILED and must be refunded.
    OrderAlreadyPaid { order: Order, payment: Payment },
}

impl SettlementOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            SettlementOutcome::Settled { payment, .. } |
            SettlementOutcome::LateForCancelledOrder { payment, .. } |
            SettlementOutcome::OrderAlreadyPaid { payment, .. } => payment,
            SettlementOutcome::AlreadySettled(payment) => payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The payment is FAILED, the reservation released and the order cancelled.
    Released { order: Order, payment: Payment },
    /// The payment is FAILED but the order was no longer awaiting payment.
    PaymentFailed(Payment),
    /// The payment had already failed or settled. Nothing changed.
    Ignored(Payment),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { payment: Payment, debit: LedgerEntry, order: Order, previous: OrderStatusType },
    AlreadyRefunded(Payment),
}

impl RefundOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            RefundOutcome::Refunded { payment, .. } => payment,
            RefundOutcome::AlreadyRefunded(payment) => payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnOutcome {
    pub request: ReturnRequest,
    pub previous: Option<ReturnStatus>,
    pub order: Order,
    pub vendor_owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutBatchResult {
    pub batch: PayoutBatch,
    pub items: Vec<PayoutItem>,
    /// False when the batch for this period already existed and was returned as is.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub status_log: Vec<OrderStatusLogEntry>,
}
