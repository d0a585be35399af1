use chrono::{DateTime, Utc};

use crate::{
    db_types::{LedgerEntry, NewPayment, Payment, PaymentProvider},
    mkt_api::errors::MarketplaceError,
    traits::data_objects::{FailureOutcome, RefundOutcome, SettlementOutcome},
};

/// Payment records, settlement and the vendor ledger.
///
/// Settlement, failure and refund are each applied in one transaction and are idempotent: status guards on the payment
/// and the `(payment_id, entry_type)` uniqueness of ledger entries make replays no-ops.
#[allow(async_fn_in_trait)]
pub trait PaymentManagement {
    /// Inserts a REQUIRES_ACTION payment.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, MarketplaceError>;

    /// Stores (or replaces) the provider reference of a payment.
    async fn attach_provider_reference(
        &self,
        payment_id: i64,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Payment, MarketplaceError>;

    /// The apply-success routine: marks the payment SUCCEEDED (updating its reference when given), consumes the
    /// order's reservation, moves the order to PAID and appends exactly one CREDIT.
    async fn settle_payment(
        &self,
        payment_id: i64,
        provider_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome, MarketplaceError>;

    /// Marks the payment FAILED. If the order is still awaiting payment, its reservation is released and it is
    /// cancelled.
    async fn fail_payment(
        &self,
        payment_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, MarketplaceError>;

    /// Records a refund: payment REFUNDED, one DEBIT, and the order REFUNDED unless it is already terminal or was never
    /// paid. A payment that is already REFUNDED is returned untouched.
    async fn refund_payment(
        &self,
        payment_id: i64,
        refund_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, MarketplaceError>;

    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, MarketplaceError>;

    async fn fetch_payment_by_reference(
        &self,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<Payment>, MarketplaceError>;

    /// The most recent payment for the order, optionally restricted to one provider.
    async fn fetch_latest_payment(
        &self,
        order_id: i64,
        provider: Option<PaymentProvider>,
    ) -> Result<Option<Payment>, MarketplaceError>;

    /// The order's SUCCEEDED or REFUNDED payment. An order has at most one.
    async fn fetch_settled_payment(&self, order_id: i64) -> Result<Option<Payment>, MarketplaceError>;

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, MarketplaceError>;

    async fn fetch_ledger_entries_for_order(&self, order_id: i64) -> Result<Vec<LedgerEntry>, MarketplaceError>;

    async fn fetch_ledger_entries_for_vendor(&self, vendor_id: i64) -> Result<Vec<LedgerEntry>, MarketplaceError>;
}
