//! # Marketplace engine public API
//!
//! The `mkt_api` module exposes the programmatic API of the marketplace engine. Each API is a thin, stateless wrapper
//! around a storage backend that implements the traits it needs, plus the event producers used for post-commit
//! effects.
//!
//! * [`checkout_api`] turns a customer's cart into a PENDING_PAYMENT order with reserved stock.
//! * [`order_flow_api`] drives the order state machine, reservation expiry and the expiry sweep.
//! * [`payment_api`] starts payments with either provider, applies webhooks and callbacks, and issues refunds.
//! * [`returns_api`] runs the return workflow that gates refunds of delivered orders.
//! * [`payout_api`] aggregates the vendor ledger into payout batches.
//! * [`order_query_api`] lists a customer's orders page by page and assembles order details.
//!
//! # API usage
//!
//! ```rust,ignore
//! use marketplace_engine::{events::EventProducers, OrderFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/marketplace.db", 5).await?;
//! let api = OrderFlowApi::new(db, EventProducers::default());
//! let outcome = api.update_status(42, OrderStatusType::Processing, &Actor::Vendor("v-1".into())).await?;
//! ```
pub mod checkout_api;
pub mod errors;
pub mod order_flow_api;
pub mod order_query_api;
pub mod payment_api;
pub mod payment_objects;
pub mod payout_api;
pub mod returns_api;

use crate::{db_types::Order, mkt_api::errors::MarketplaceError, traits::CatalogManagement};

/// The user id owning the order's vendor.
pub(crate) async fn vendor_owner<B: CatalogManagement>(db: &B, order: &Order) -> Result<String, MarketplaceError> {
    db.fetch_vendor(order.vendor_id)
        .await?
        .map(|v| v.owner_user_id)
        .ok_or(MarketplaceError::VendorNotFound(order.vendor_id))
}
