//! Vendors, products, variants, addresses, pickup locations, shipping rates and carts.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        Address,
        Cart,
        CartItem,
        CartLine,
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

//--------------------------------------        Vendors        ---------------------------------------------------------

pub async fn insert_vendor(
    vendor: NewVendor,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vendor, MarketplaceError> {
    let vendor = sqlx::query_as(
        r#"
            INSERT INTO vendors (owner_user_id, name, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(vendor.owner_user_id)
    .bind(vendor.name)
    .bind(VendorStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(vendor)
}

pub async fn fetch_vendor(vendor_id: i64, conn: &mut SqliteConnection) -> Result<Option<Vendor>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vendors WHERE id = $1").bind(vendor_id).fetch_optional(conn).await
}

pub async fn fetch_vendor_for_owner(owner: &str, conn: &mut SqliteConnection) -> Result<Option<Vendor>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vendors WHERE owner_user_id = $1").bind(owner).fetch_optional(conn).await
}

pub async fn update_vendor_status(
    vendor_id: i64,
    status: VendorStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Vendor>, sqlx::Error> {
    sqlx::query_as("UPDATE vendors SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(status)
        .bind(now)
        .bind(vendor_id)
        .fetch_optional(conn)
        .await
}

/// The user id owning the vendor. Every order's vendor exists, so a missing row is an internal error.
pub async fn vendor_owner(vendor_id: i64, conn: &mut SqliteConnection) -> Result<String, MarketplaceError> {
    let owner: Option<String> = sqlx::query_scalar("SELECT owner_user_id FROM vendors WHERE id = $1")
        .bind(vendor_id)
        .fetch_optional(conn)
        .await?;
    owner.ok_or_else(|| MarketplaceError::InternalError(format!("Vendor {vendor_id} has disappeared")))
}

//--------------------------------------   Products/Variants   ---------------------------------------------------------

pub async fn insert_product(
    product: NewProduct,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Product, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO products (vendor_id, title, status, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(product.vendor_id)
    .bind(product.title)
    .bind(product.status)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await
}

pub async fn insert_variant(
    variant: NewVariant,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ProductVariant, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO product_variants (product_id, sku, price, currency, stock_qty, reserved_qty, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING *;
        "#,
    )
    .bind(variant.product_id)
    .bind(variant.sku)
    .bind(variant.price)
    .bind(variant.currency)
    .bind(variant.stock_qty)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn fetch_variant(
    variant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ProductVariant>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM product_variants WHERE id = $1").bind(variant_id).fetch_optional(conn).await
}

/// The vendor selling a variant, with the variant's currency.
pub async fn fetch_variant_vendor(
    variant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<(i64, String)>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT p.vendor_id, v.currency
            FROM product_variants v JOIN products p ON p.id = v.product_id
            WHERE v.id = $1
        "#,
    )
    .bind(variant_id)
    .fetch_optional(conn)
    .await
}

//--------------------------------------  Addresses/Pickups   ---------------------------------------------------------

pub async fn insert_address(
    address: NewAddress,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Address, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO addresses (owner_user_id, line1, city, country, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(address.owner_user_id)
    .bind(address.line1)
    .bind(address.city)
    .bind(address.country.to_uppercase())
    .bind(now)
    .fetch_one(conn)
    .await
}

/// The address, provided it belongs to `owner`.
pub async fn fetch_owned_address(
    address_id: i64,
    owner: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Address>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM addresses WHERE id = $1 AND owner_user_id = $2")
        .bind(address_id)
        .bind(owner)
        .fetch_optional(conn)
        .await
}

pub async fn insert_pickup_location(
    vendor_id: i64,
    name: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PickupLocation, sqlx::Error> {
    sqlx::query_as("INSERT INTO pickup_locations (vendor_id, name, created_at) VALUES ($1, $2, $3) RETURNING *")
        .bind(vendor_id)
        .bind(name)
        .bind(now)
        .fetch_one(conn)
        .await
}

/// The pickup location, provided it belongs to `vendor_id`.
pub async fn fetch_vendor_pickup_location(
    location_id: i64,
    vendor_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PickupLocation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM pickup_locations WHERE id = $1 AND vendor_id = $2")
        .bind(location_id)
        .bind(vendor_id)
        .fetch_optional(conn)
        .await
}

//--------------------------------------    Shipping rates     ---------------------------------------------------------

pub async fn insert_shipping_rate(
    rate: NewShippingRate,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ShippingRate, MarketplaceError> {
    let vendor_id = rate.vendor_id;
    let country = rate.country.to_uppercase();
    let result = sqlx::query_as(
        r#"
            INSERT INTO shipping_rates (vendor_id, country, fee, currency, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(vendor_id)
    .bind(&country)
    .bind(rate.fee)
    .bind(rate.currency)
    .bind(rate.active)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(rate) => Ok(rate),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(MarketplaceError::ShippingRateExists { vendor_id, country })
        },
        Err(e) => Err(e.into()),
    }
}

/// The vendor's active rate for `country` in `currency`.
pub async fn fetch_active_shipping_rate(
    vendor_id: i64,
    country: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ShippingRate>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM shipping_rates WHERE vendor_id = $1 AND country = $2 AND currency = $3 AND active = TRUE",
    )
    .bind(vendor_id)
    .bind(country.to_uppercase())
    .bind(currency)
    .fetch_optional(conn)
    .await
}

//--------------------------------------         Carts         ---------------------------------------------------------

pub async fn fetch_cart(customer_id: &str, conn: &mut SqliteConnection) -> Result<Option<Cart>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM carts WHERE customer_id = $1").bind(customer_id).fetch_optional(conn).await
}

async fn insert_cart(
    customer_id: &str,
    vendor_id: i64,
    currency: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Cart, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO carts (customer_id, vendor_id, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(vendor_id)
    .bind(currency)
    .bind(now)
    .fetch_one(conn)
    .await
}

/// Adds `qty` of a variant to the customer's cart, creating the cart on first use. Quantities of a variant that is
/// already in the cart are added together.
pub async fn add_cart_item(
    customer_id: &str,
    variant_id: i64,
    qty: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Cart, MarketplaceError> {
    if qty <= 0 {
        return Err(MarketplaceError::ValidationError(format!("Quantity must be positive, not {qty}")));
    }
    let (vendor_id, currency) =
        fetch_variant_vendor(variant_id, conn).await?.ok_or(MarketplaceError::VariantNotFound(variant_id))?;
    let cart = match fetch_cart(customer_id, conn).await? {
        Some(cart) if cart.vendor_id != vendor_id => {
            return Err(MarketplaceError::ValidationError(format!(
                "The cart holds items from vendor {}. Check out or empty it before buying from vendor {vendor_id}",
                cart.vendor_id
            )));
        },
        Some(cart) if cart.currency != currency => {
            return Err(MarketplaceError::CurrencyMismatch { expected: cart.currency, found: currency });
        },
        Some(cart) => cart,
        None => insert_cart(customer_id, vendor_id, &currency, now, conn).await?,
    };
    sqlx::query(
        r#"
            INSERT INTO cart_items (cart_id, variant_id, qty) VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, variant_id) DO UPDATE SET qty = qty + excluded.qty
        "#,
    )
    .bind(cart.id)
    .bind(variant_id)
    .bind(qty)
    .execute(&mut *conn)
    .await?;
    let cart = sqlx::query_as("UPDATE carts SET updated_at = $1 WHERE id = $2 RETURNING *")
        .bind(now)
        .bind(cart.id)
        .fetch_one(conn)
        .await?;
    trace!("🛒 Added {qty} x variant {variant_id} to the cart of {customer_id}");
    Ok(cart)
}

pub async fn fetch_cart_items(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM cart_items WHERE cart_id = $1 ORDER BY id").bind(cart_id).fetch_all(conn).await
}

/// The cart's items joined with their variants and products, in the order they were added.
pub async fn fetch_cart_lines(cart_id: i64, conn: &mut SqliteConnection) -> Result<Vec<CartLine>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT
                ci.id AS item_id,
                ci.variant_id,
                ci.qty,
                v.sku,
                v.price,
                v.currency,
                v.stock_qty,
                v.reserved_qty,
                p.id AS product_id,
                p.title AS product_title,
                p.status AS product_status,
                p.vendor_id
            FROM cart_items ci
            JOIN product_variants v ON v.id = ci.variant_id
            JOIN products p ON p.id = v.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.id
        "#,
    )
    .bind(cart_id)
    .fetch_all(conn)
    .await
}

pub async fn delete_cart(cart_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(&mut *conn).await?;
    sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(conn).await?;
    Ok(())
}
