//! The behaviour a storage backend must provide to the marketplace engine.
mod card_network;
mod catalog_management;
mod discounts;
mod job_queue;
mod order_management;
mod payment_management;
mod payout_management;
mod return_management;

pub mod data_objects;

pub use card_network::CardNetworkClient;
pub use catalog_management::CatalogManagement;
pub use discounts::{DiscountResolver, NoDiscounts};
pub use job_queue::JobQueue;
pub use order_management::OrderManagement;
pub use payment_management::PaymentManagement;
pub use payout_management::PayoutManagement;
pub use return_management::ReturnManagement;

/// Everything the marketplace needs from a backend.
pub trait MarketplaceDatabase:
    Clone + OrderManagement + PaymentManagement + ReturnManagement + PayoutManagement + CatalogManagement + JobQueue
{
    /// The URL of the database
    fn url(&self) -> &str;
}
