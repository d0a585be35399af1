use card_network_tools::CardNetworkError;
use log::*;
use thiserror::Error;

use crate::db_types::{FulfillmentKind, MinorUnits, OrderStatusType, PaymentProvider, ReturnStatus};

/// The broad class of a [`MarketplaceError`]. Job workers use it to decide whether to retry; the server uses it to pick
/// an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or a business rule said no. Never retried.
    Validation,
    Conflict,
    NotFound,
    Forbidden,
    /// The payment provider rejected the call.
    Provider,
    /// Storage contention or provider unavailability. Safe to retry later.
    Transient,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum MarketplaceError {
    //------------------------------------   checkout   ------------------------------------
    #[error("The cart is empty")]
    CartEmpty,
    #[error("Vendor {0} is not approved to sell")]
    VendorNotApproved(i64),
    #[error("Product {0} is not active")]
    ProductNotActive(i64),
    #[error("Insufficient stock for variant {variant_id}. Requested {requested}, but only {available} available")]
    InsufficientStock { variant_id: i64, requested: i64, available: i64 },
    #[error("A shipping address is required for shipped orders")]
    ShippingAddressRequired,
    #[error("Shipping address {0} was not found")]
    ShippingAddressNotFound(i64),
    #[error("No active shipping rate to {country} in {currency}")]
    ShippingRateUnavailable { country: String, currency: String },
    #[error("A pickup location is required for pickup orders")]
    PickupLocationRequired,
    #[error("Pickup location {0} was not found")]
    PickupLocationNotFound(i64),
    #[error("Currency mismatch. Expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },
    #[error("The amount for {0} is too large to represent")]
    AmountOutOfRange(String),
    #[error("Order totals do not add up. Stored total is {stored}, but the items add up to {computed}")]
    TotalMismatch { stored: MinorUnits, computed: MinorUnits },
    //------------------------------------   orders     ------------------------------------
    #[error("Cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("{to} is not a valid status for a {kind} order")]
    FulfillmentMismatch { kind: FulfillmentKind, to: OrderStatusType },
    #[error("Forbidden. {0}")]
    Forbidden(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} is not awaiting payment")]
    OrderNotPayable(i64),
    #[error("The page token could not be decoded. {0}")]
    InvalidPageToken(String),
    //------------------------------------   payments   ------------------------------------
    #[error("No payment found for {0}")]
    PaymentNotFound(String),
    #[error("Payment {0} has not succeeded and cannot be refunded")]
    PaymentNotRefundable(i64),
    #[error("Payment provider {0} is not available")]
    ProviderNotAvailable(PaymentProvider),
    #[error("The provider reference '{0}' has an unrecognized shape")]
    UnrecognizedReference(String),
    #[error("Invalid webhook. {0}")]
    InvalidWebhook(String),
    #[error("Payment provider error. {0}")]
    ProviderError(String),
    #[error("Payment provider temporarily unavailable. {0}")]
    ProviderUnavailable(String),
    //------------------------------------   returns    ------------------------------------
    #[error("Return {0} does not exist")]
    ReturnNotFound(i64),
    #[error("A return cannot be opened for an order that is {0}")]
    ReturnNotAllowed(OrderStatusType),
    #[error("The return window of {0} days has passed")]
    ReturnWindowExpired(i64),
    #[error("Order {0} already has an open return")]
    ReturnAlreadyOpen(i64),
    #[error("Cannot move a return from {from} to {to}")]
    InvalidReturnTransition { from: ReturnStatus, to: ReturnStatus },
    //------------------------------------   catalog    ------------------------------------
    #[error("User {0} already has a vendor application")]
    VendorApplicationExists(String),
    #[error("Vendor {0} does not exist")]
    VendorNotFound(i64),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Variant {0} does not exist")]
    VariantNotFound(i64),
    #[error("Vendor {vendor_id} already has a shipping rate for {country}")]
    ShippingRateExists { vendor_id: i64, country: String },
    #[error("Invalid request. {0}")]
    ValidationError(String),
    //------------------------------------   payouts    ------------------------------------
    #[error("Invalid payout period. {0}")]
    InvalidPayoutPeriod(String),
    //------------------------------------   plumbing   ------------------------------------
    #[error("The database is busy. {0}")]
    DatabaseBusy(String),
    #[error("A unique constraint was violated. {0}")]
    UniqueViolation(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Could not read job payload. {0}")]
    JobPayloadError(String),
    #[error("Internal error. {0}")]
    InternalError(String),
}

impl MarketplaceError {
    pub fn kind(&self) -> ErrorKind {
        use MarketplaceError::*;
        match self {
            CartEmpty |
            VendorNotApproved(_) |
            ProductNotActive(_) |
            InsufficientStock { .. } |
            ShippingAddressRequired |
            ShippingAddressNotFound(_) |
            ShippingRateUnavailable { .. } |
            PickupLocationRequired |
            PickupLocationNotFound(_) |
            CurrencyMismatch { .. } |
            TotalMismatch { .. } |
            AmountOutOfRange(_) |
            InvalidTransition { .. } |
            FulfillmentMismatch { .. } |
            OrderNotPayable(_) |
            InvalidPageToken(_) |
            PaymentNotRefundable(_) |
            ProviderNotAvailable(_) |
            UnrecognizedReference(_) |
            InvalidWebhook(_) |
            ReturnNotAllowed(_) |
            ReturnWindowExpired(_) |
            InvalidReturnTransition { .. } |
            ValidationError(_) |
            InvalidPayoutPeriod(_) => ErrorKind::Validation,
            ReturnAlreadyOpen(_) | VendorApplicationExists(_) | ShippingRateExists { .. } | UniqueViolation(_) => {
                ErrorKind::Conflict
            },
            OrderNotFound(_) |
            PaymentNotFound(_) |
            ReturnNotFound(_) |
            VendorNotFound(_) |
            ProductNotFound(_) |
            VariantNotFound(_) => ErrorKind::NotFound,
            Forbidden(_) => ErrorKind::Forbidden,
            ProviderError(_) => ErrorKind::Provider,
            ProviderUnavailable(_) | DatabaseBusy(_) => ErrorKind::Transient,
            DatabaseError(_) | JobPayloadError(_) | InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// SQLite primary result codes for lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`). Extended codes keep these in the
/// low byte.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) => {
                let primary_code = db_err.code().and_then(|c| c.parse::<i64>().ok()).map(|c| c & 0xff);
                if matches!(primary_code, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                    debug!("🗃️ Database contention: {e}");
                    Self::DatabaseBusy(e.to_string())
                } else if db_err.is_unique_violation() {
                    Self::UniqueViolation(e.to_string())
                } else {
                    Self::DatabaseError(e.to_string())
                }
            },
            sqlx::Error::PoolTimedOut => Self::DatabaseBusy(e.to_string()),
            _ => Self::DatabaseError(e.to_string()),
        }
    }
}

impl From<CardNetworkError> for MarketplaceError {
    fn from(e: CardNetworkError) -> Self {
        match e {
            CardNetworkError::InvalidSignature(_) | CardNetworkError::MalformedWebhook(_) => {
                Self::InvalidWebhook(e.to_string())
            },
            CardNetworkError::NotConfigured(_) => Self::ProviderNotAvailable(PaymentProvider::CardNetwork),
            e if e.is_transient() => Self::ProviderUnavailable(e.to_string()),
            e => Self::ProviderError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for MarketplaceError {
    fn from(e: serde_json::Error) -> Self {
        Self::JobPayloadError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn provider_errors_are_classified() {
        let e = MarketplaceError::from(CardNetworkError::QueryError { status: 502, message: "bad gateway".into() });
        assert_eq!(e.kind(), ErrorKind::Transient);
        let e = MarketplaceError::from(CardNetworkError::QueryError { status: 402, message: "card declined".into() });
        assert_eq!(e.kind(), ErrorKind::Provider);
        let e = MarketplaceError::from(CardNetworkError::InvalidSignature("nope".into()));
        assert_eq!(e.kind(), ErrorKind::Validation);
        let e = MarketplaceError::from(CardNetworkError::NotConfigured("no key".into()));
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn checkout_errors_are_validation_errors() {
        let e = MarketplaceError::InsufficientStock { variant_id: 1, requested: 2, available: 0 };
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert!(!e.is_retryable());
        assert!(MarketplaceError::DatabaseBusy("locked".into()).is_retryable());
    }
}
