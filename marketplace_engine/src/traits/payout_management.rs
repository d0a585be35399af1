use chrono::{DateTime, Utc};

use crate::{
    db_types::{PayoutBatch, PayoutItem},
    mkt_api::errors::MarketplaceError,
    traits::data_objects::PayoutBatchResult,
};

#[allow(async_fn_in_trait)]
pub trait PayoutManagement {
    async fn fetch_payout_batch(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<PayoutBatch>, MarketplaceError>;

    /// Returns the existing batch for the period, or aggregates the ledger entries created in
    /// `[period_start, period_end)` per vendor and currency into a new batch.
    async fn create_payout_batch(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PayoutBatchResult, MarketplaceError>;

    async fn fetch_payout_items(&self, batch_id: i64) -> Result<Vec<PayoutItem>, MarketplaceError>;
}
