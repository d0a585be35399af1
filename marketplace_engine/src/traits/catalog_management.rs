use chrono::{DateTime, Utc};

use crate::{
    db_types::{
        Address,
        Cart,
        CartItem,
        NewAddress,
        NewProduct,
        NewShippingRate,
        NewVariant,
        NewVendor,
        PickupLocation,
        Product,
        ProductVariant,
        ShippingRate,
        Vendor,
        VendorStatus,
    },
    mkt_api::errors::MarketplaceError,
};

/// The minimal write surface for the records checkout reads. Full catalog and profile management lives elsewhere.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    /// Creates a PENDING vendor. A user can only ever have one vendor application.
    async fn create_vendor_application(&self, vendor: NewVendor, now: DateTime<Utc>)
        -> Result<Vendor, MarketplaceError>;

    async fn set_vendor_status(
        &self,
        vendor_id: i64,
        status: VendorStatus,
        now: DateTime<Utc>,
    ) -> Result<Vendor, MarketplaceError>;

    async fn fetch_vendor(&self, vendor_id: i64) -> Result<Option<Vendor>, MarketplaceError>;

    async fn create_product(&self, product: NewProduct, now: DateTime<Utc>) -> Result<Product, MarketplaceError>;

    async fn create_variant(&self, variant: NewVariant, now: DateTime<Utc>)
        -> Result<ProductVariant, MarketplaceError>;

    async fn fetch_variant(&self, variant_id: i64) -> Result<Option<ProductVariant>, MarketplaceError>;

    /// Adds `qty` units to a variant's stock.
    async fn restock_variant(
        &self,
        variant_id: i64,
        qty: i64,
        now: DateTime<Utc>,
    ) -> Result<ProductVariant, MarketplaceError>;

    /// One rate per vendor and country.
    async fn add_shipping_rate(&self, rate: NewShippingRate, now: DateTime<Utc>)
        -> Result<ShippingRate, MarketplaceError>;

    async fn add_address(&self, address: NewAddress, now: DateTime<Utc>) -> Result<Address, MarketplaceError>;

    async fn add_pickup_location(
        &self,
        vendor_id: i64,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<PickupLocation, MarketplaceError>;

    /// Adds a variant to the customer's cart, creating the cart if needed. A cart holds items from a single vendor in a
    /// single currency. Adding a variant already in the cart increases its quantity.
    async fn add_to_cart(
        &self,
        customer_id: &str,
        variant_id: i64,
        qty: i64,
        now: DateTime<Utc>,
    ) -> Result<Cart, MarketplaceError>;

    async fn fetch_cart_items(&self, customer_id: &str) -> Result<Vec<CartItem>, MarketplaceError>;
}
