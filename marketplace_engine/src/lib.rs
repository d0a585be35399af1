//! Marketplace Engine
//!
//! The settlement core of a multi-vendor marketplace: it turns carts into orders without overselling, takes payment
//! through an asynchronous card network or a synchronous mobile money provider, applies provider webhooks exactly once,
//! records the vendor ledger, runs returns and refunds, and aggregates weekly vendor payouts.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend in [`mod@sqlite`]). Backends implement the traits in
//!    [`mod@traits`]; callers should never need to touch the database directly. The data types stored in the database
//!    live in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@mkt_api`]): checkout, the order state machine, payments, returns, payouts and order
//!    queries.
//! 3. Background work ([`mod@jobs`]): a durable job queue with retries and a dead-letter state, used for reservation
//!    expiry and payout aggregation.
//!
//! State changes never notify anyone from inside a transaction. The engine emits [`events::Notification`]s and
//! [`events::RealtimeEvent`]s after commit; hook into them with [`events::EventHooks`].
pub mod checkout;
pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod jobs;
pub mod mkt_api;
pub mod providers;
pub mod state_machine;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test_utils")]
pub mod test_utils;

pub use config::{MarketplaceConfig, PaymentConfig, RetryPolicy};
pub use jobs::{JobRunner, RunSummary};
pub use mkt_api::{
    checkout_api::CheckoutApi,
    errors::{ErrorKind, MarketplaceError},
    order_flow_api::OrderFlowApi,
    order_query_api::{OrderPage, OrderQueryApi},
    payment_api::PaymentApi,
    payment_objects,
    payout_api::{PayoutApi, PayoutPeriod},
    returns_api::ReturnsApi,
};
pub use providers::{CardNetworkGateway, MobileMoneyGateway, PaymentGateways};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CardNetworkClient,
    CatalogManagement,
    JobQueue,
    MarketplaceDatabase,
    OrderManagement,
    PaymentManagement,
    PayoutManagement,
    ReturnManagement,
};
