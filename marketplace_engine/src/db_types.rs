//! Records stored by the marketplace backend, and the small enums that describe their states.
//!
//! All monetary amounts are [`MinorUnits`] in the currency stored alongside them. Timestamps are always supplied by the
//! caller (never defaulted by the database) so that they sort and compare consistently.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use mkt_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Implements `Display` and `FromStr` for an enum using its SCREAMING_SNAKE_CASE storage names.
macro_rules! storage_names {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// Created at checkout. Stock is reserved until `payment_expires_at`.
    PendingPayment,
    /// A payment succeeded. The reservation has been consumed and the vendor credited.
    Paid,
    Processing,
    Packed,
    Shipped,
    ReadyForPickup,
    Delivered,
    PickedUp,
    ReturnRequested,
    ReturnApproved,
    Returned,
    /// Terminal. The payment was refunded and the vendor debited.
    Refunded,
    /// Terminal. Any reservation has been released.
    Canceled,
}

storage_names!(OrderStatusType {
    PendingPayment => "PENDING_PAYMENT",
    Paid => "PAID",
    Processing => "PROCESSING",
    Packed => "PACKED",
    Shipped => "SHIPPED",
    ReadyForPickup => "READY_FOR_PICKUP",
    Delivered => "DELIVERED",
    PickedUp => "PICKED_UP",
    ReturnRequested => "RETURN_REQUESTED",
    ReturnApproved => "RETURN_APPROVED",
    Returned => "RETURNED",
    Refunded => "REFUNDED",
    Canceled => "CANCELED",
});

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refunded | Self::Canceled)
    }
}

//--------------------------------------   FulfillmentKind     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentKind {
    Shipping,
    Pickup,
}

storage_names!(FulfillmentKind { Shipping => "SHIPPING", Pickup => "PICKUP" });

//--------------------------------------     VendorStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorStatus {
    Pending,
    Approved,
    Suspended,
}

storage_names!(VendorStatus { Pending => "PENDING", Approved => "APPROVED", Suspended => "SUSPENDED" });

//--------------------------------------     ProductStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

storage_names!(ProductStatus { Draft => "DRAFT", Active => "ACTIVE", Archived => "ARCHIVED" });

//--------------------------------------    PaymentProvider    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    /// Asynchronous. Confirmed by signed webhook.
    CardNetwork,
    /// Synchronous mobile money providers. Confirmed in-process.
    MobileMoneyA,
    MobileMoneyB,
}

storage_names!(PaymentProvider {
    CardNetwork => "CARD_NETWORK",
    MobileMoneyA => "MOBILE_MONEY_A",
    MobileMoneyB => "MOBILE_MONEY_B",
});

impl PaymentProvider {
    pub fn is_synchronous(&self) -> bool {
        !matches!(self, Self::CardNetwork)
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    RequiresAction,
    Succeeded,
    Failed,
    Refunded,
}

storage_names!(PaymentStatus {
    RequiresAction => "REQUIRES_ACTION",
    Succeeded => "SUCCEEDED",
    Failed => "FAILED",
    Refunded => "REFUNDED",
});

impl PaymentStatus {
    /// Settled payments are never touched by a success or failure confirmation again.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Refunded)
    }
}

//--------------------------------------    LedgerEntryType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    Credit,
    Debit,
}

storage_names!(LedgerEntryType { Credit => "CREDIT", Debit => "DEBIT" });

//--------------------------------------   PayoutItemStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutItemStatus {
    Ready,
    Skipped,
}

storage_names!(PayoutItemStatus { Ready => "READY", Skipped => "SKIPPED" });

//--------------------------------------     ReturnStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Requested,
    Approved,
    Received,
    Refunded,
    Rejected,
}

storage_names!(ReturnStatus {
    Requested => "REQUESTED",
    Approved => "APPROVED",
    Received => "RECEIVED",
    Refunded => "REFUNDED",
    Rejected => "REJECTED",
});

impl ReturnStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Requested | Self::Approved | Self::Received)
    }
}

//--------------------------------------       JobStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    /// Dead-lettered after a non-retryable failure or too many attempts.
    Dead,
}

storage_names!(JobStatus { Queued => "QUEUED", Running => "RUNNING", Done => "DONE", Dead => "DEAD" });

//--------------------------------------         Actor         ---------------------------------------------------------
/// Who is asking for a change. User ids are issued by the (external) authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "user_id", rename_all = "snake_case")]
pub enum Actor {
    Customer(String),
    Vendor(String),
    Operator(String),
    /// Payment and return callbacks, workers.
    System,
}

impl Actor {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::Customer(id) | Actor::Vendor(id) | Actor::Operator(id) => Some(id.as_str()),
            Actor::System => None,
        }
    }

    /// The label written to the order status log.
    pub fn label(&self) -> String {
        match self {
            Actor::Customer(id) => format!("customer:{id}"),
            Actor::Vendor(id) => format!("vendor:{id}"),
            Actor::Operator(id) => format!("operator:{id}"),
            Actor::System => "system".to_string(),
        }
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

//--------------------------------------        Vendor         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub owner_user_id: String,
    pub name: String,
    pub status: VendorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVendor {
    pub owner_user_id: String,
    pub name: String,
}

impl NewVendor {
    pub fn new<S1: Into<String>, S2: Into<String>>(owner_user_id: S1, name: S2) -> Self {
        Self { owner_user_id: owner_user_id.into(), name: name.into() }
    }
}

//--------------------------------------   Product & Variant   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub vendor_id: i64,
    pub title: String,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub vendor_id: i64,
    pub title: String,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub price: MinorUnits,
    pub currency: String,
    pub stock_qty: i64,
    pub reserved_qty: i64,
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    pub fn available(&self) -> i64 {
        self.stock_qty - self.reserved_qty
    }
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub product_id: i64,
    pub sku: String,
    pub price: MinorUnits,
    pub currency: String,
    pub stock_qty: i64,
}

//--------------------------------------  Address & Pickup    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub owner_user_id: String,
    pub line1: String,
    pub city: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAddress {
    pub owner_user_id: String,
    pub line1: String,
    pub city: String,
    /// ISO 3166 alpha-2 country code, matched against shipping rates.
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PickupLocation {
    pub id: i64,
    pub vendor_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ShippingRate {
    pub id: i64,
    pub vendor_id: i64,
    pub country: String,
    pub fee: MinorUnits,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShippingRate {
    pub vendor_id: i64,
    pub country: String,
    pub fee: MinorUnits,
    pub currency: String,
    pub active: bool,
}

//--------------------------------------         Cart          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Cart {
    pub id: i64,
    pub customer_id: String,
    pub vendor_id: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub variant_id: i64,
    pub qty: i64,
}

/// A cart item joined with its variant and product, as read by checkout.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CartLine {
    pub item_id: i64,
    pub variant_id: i64,
    pub qty: i64,
    pub sku: String,
    pub price: MinorUnits,
    pub currency: String,
    pub stock_qty: i64,
    pub reserved_qty: i64,
    pub product_id: i64,
    pub product_title: String,
    pub product_status: ProductStatus,
    pub vendor_id: i64,
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: String,
    pub vendor_id: i64,
    pub status: OrderStatusType,
    pub currency: String,
    pub subtotal: MinorUnits,
    pub shipping_fee: MinorUnits,
    pub tax_amount: MinorUnits,
    pub discount_amount: MinorUnits,
    pub total: MinorUnits,
    pub fulfillment: FulfillmentKind,
    pub shipping_address_id: Option<i64>,
    pub pickup_location_id: Option<i64>,
    pub promo_code: Option<String>,
    /// Only set while the order is `PENDING_PAYMENT`.
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert an order. Built by checkout once the cart has been validated and priced.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: String,
    pub vendor_id: i64,
    pub currency: String,
    pub subtotal: MinorUnits,
    pub shipping_fee: MinorUnits,
    pub tax_amount: MinorUnits,
    pub discount_amount: MinorUnits,
    pub total: MinorUnits,
    pub fulfillment: FulfillmentKind,
    pub shipping_address_id: Option<i64>,
    pub pickup_location_id: Option<i64>,
    pub promo_code: Option<String>,
    pub payment_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub variant_id: i64,
    pub title: String,
    pub qty: i64,
    /// Price snapshot taken at checkout. Never recomputed.
    pub unit_price: MinorUnits,
    pub line_total: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub variant_id: i64,
    pub title: String,
    pub qty: i64,
    pub unit_price: MinorUnits,
    pub line_total: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatusLogEntry {
    pub id: i64,
    pub order_id: i64,
    pub from_status: Option<OrderStatusType>,
    pub to_status: OrderStatusType,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub provider: PaymentProvider,
    /// Provider reference. Its prefix encodes what it refers to (`cs_`, `pi_`, `ch_`, `mma_`, `mmb_`).
    pub provider_ref: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: PaymentStatus,
    pub refund_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub provider: PaymentProvider,
    pub provider_ref: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      LedgerEntry      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub vendor_id: i64,
    pub order_id: i64,
    pub payment_id: i64,
    pub entry_type: LedgerEntryType,
    pub amount: MinorUnits,
    pub currency: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Payouts        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutBatch {
    pub id: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutItem {
    pub id: i64,
    pub batch_id: i64,
    pub vendor_id: i64,
    pub currency: String,
    pub gross_amount: MinorUnits,
    pub refund_amount: MinorUnits,
    pub net_amount: MinorUnits,
    pub status: PayoutItemStatus,
}

//--------------------------------------     ReturnRequest     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: String,
    pub vendor_id: i64,
    pub reason: String,
    pub status: ReturnStatus,
    /// The refund fields are only populated once the return is `REFUNDED`.
    pub refund_amount: Option<MinorUnits>,
    pub refund_reference: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
