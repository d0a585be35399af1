use chrono::{DateTime, Utc};

use crate::{
    db_types::{Actor, MinorUnits, ReturnRequest},
    mkt_api::errors::MarketplaceError,
    traits::data_objects::ReturnOutcome,
};

/// The return workflow: REQUESTED → APPROVED → RECEIVED → REFUNDED, or REQUESTED → REJECTED. Each step moves the order
/// along with it in the same transaction.
#[allow(async_fn_in_trait)]
pub trait ReturnManagement {
    /// Opens a return on a DELIVERED or PICKED_UP order owned by `customer_id`, provided the order was last updated
    /// within `window_days` and has no other open return.
    async fn open_return(
        &self,
        order_id: i64,
        customer_id: &str,
        reason: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError>;

    /// Approves or rejects a REQUESTED return. Rejection sends the order back to DELIVERED or PICKED_UP.
    async fn review_return(
        &self,
        return_id: i64,
        actor: &Actor,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError>;

    /// Marks an APPROVED return as RECEIVED. The order becomes RETURNED.
    async fn receive_return(
        &self,
        return_id: i64,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError>;

    /// Marks a RECEIVED return as REFUNDED and records the refund details. The payment side of the refund must already
    /// have been recorded.
    async fn complete_return_refund(
        &self,
        return_id: i64,
        amount: MinorUnits,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, MarketplaceError>;

    async fn fetch_return(&self, return_id: i64) -> Result<Option<ReturnRequest>, MarketplaceError>;

    async fn fetch_open_return_for_order(&self, order_id: i64) -> Result<Option<ReturnRequest>, MarketplaceError>;
}
