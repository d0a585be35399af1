//! Pure checkout rules: cart validation, price snapshots and order totals.
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        CartLine,
        FulfillmentKind,
        MinorUnits,
        NewOrderItem,
        Order,
        OrderItem,
        ProductStatus,
        Vendor,
        VendorStatus,
    },
    mkt_api::errors::MarketplaceError,
};

/// What the customer chose at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub fulfillment: FulfillmentKind,
    pub shipping_address_id: Option<i64>,
    pub pickup_location_id: Option<i64>,
    pub promo_code: Option<String>,
}

impl CheckoutRequest {
    pub fn shipping<S: Into<String>>(customer_id: S, address_id: i64) -> Self {
        Self {
            customer_id: customer_id.into(),
            fulfillment: FulfillmentKind::Shipping,
            shipping_address_id: Some(address_id),
            pickup_location_id: None,
            promo_code: None,
        }
    }

    pub fn pickup<S: Into<String>>(customer_id: S, location_id: i64) -> Self {
        Self {
            customer_id: customer_id.into(),
            fulfillment: FulfillmentKind::Pickup,
            shipping_address_id: None,
            pickup_location_id: Some(location_id),
            promo_code: None,
        }
    }

    pub fn with_promo_code<S: Into<String>>(mut self, code: S) -> Self {
        self.promo_code = Some(code.into());
        self
    }
}

/// Checks the vendor and every cart line. Stock is checked against `stock_qty - reserved_qty` as read; the conditional
/// reservation update is what actually guards against concurrent checkouts.
pub fn validate_cart(vendor: &Vendor, currency: &str, lines: &[CartLine]) -> Result<(), MarketplaceError> {
    if lines.is_empty() {
        return Err(MarketplaceError::CartEmpty);
    }
    if vendor.status != VendorStatus::Approved {
        return Err(MarketplaceError::VendorNotApproved(vendor.id));
    }
    for line in lines {
        if line.product_status != ProductStatus::Active {
            return Err(MarketplaceError::ProductNotActive(line.product_id));
        }
        if line.vendor_id != vendor.id {
            return Err(MarketplaceError::ValidationError(format!(
                "Variant {} does not belong to vendor {}",
                line.variant_id, vendor.id
            )));
        }
        if line.currency != currency {
            let found = line.currency.clone();
            return Err(MarketplaceError::CurrencyMismatch { expected: currency.to_string(), found });
        }
        let available = line.stock_qty - line.reserved_qty;
        if line.qty > available {
            return Err(MarketplaceError::InsufficientStock {
                variant_id: line.variant_id,
                requested: line.qty,
                available,
            });
        }
    }
    Ok(())
}

fn out_of_range(what: &str) -> MarketplaceError {
    MarketplaceError::AmountOutOfRange(what.to_string())
}

/// Snapshots the variant prices into order items.
pub fn price_lines(lines: &[CartLine]) -> Result<Vec<NewOrderItem>, MarketplaceError> {
    lines
        .iter()
        .map(|line| {
            let line_total = line.price.checked_mul(line.qty).ok_or_else(|| out_of_range(&line.sku))?;
            Ok(NewOrderItem {
                variant_id: line.variant_id,
                title: format!("{} ({})", line.product_title, line.sku),
                qty: line.qty,
                unit_price: line.price,
                line_total,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: MinorUnits,
    pub shipping_fee: MinorUnits,
    pub tax_amount: MinorUnits,
    pub discount_amount: MinorUnits,
    pub total: MinorUnits,
}

impl OrderTotals {
    /// `total = subtotal + shipping + tax - discount`, with the discount clamped to `[0, subtotal + shipping]`.
    pub fn compute(
        subtotal: MinorUnits,
        shipping_fee: MinorUnits,
        discount: MinorUnits,
    ) -> Result<Self, MarketplaceError> {
        let tax_amount = MinorUnits::zero();
        let before_tax = subtotal.checked_add(shipping_fee).ok_or_else(|| out_of_range("order total"))?;
        let discount_amount = discount.clamp_to(before_tax);
        let total = before_tax
            .checked_add(tax_amount)
            .and_then(|gross| gross.checked_sub(discount_amount))
            .ok_or_else(|| out_of_range("order total"))?;
        Ok(Self { subtotal, shipping_fee, tax_amount, discount_amount, total })
    }
}

/// `sum(line_total)`.
pub fn subtotal<'a, I: IntoIterator<Item = &'a NewOrderItem>>(items: I) -> Result<MinorUnits, MarketplaceError> {
    MinorUnits::checked_sum(items.into_iter().map(|i| i.line_total)).ok_or_else(|| out_of_range("subtotal"))
}

/// Recomputes the order total from the item snapshots (`unit_price * qty`) and the stored fees, and compares it with
/// the stored total. Run before any charge is created.
pub fn verify_order_total(order: &Order, items: &[OrderItem]) -> Result<(), MarketplaceError> {
    let lines = items.iter().map(|i| i.unit_price.checked_mul(i.qty)).collect::<Option<Vec<_>>>();
    let computed = lines
        .and_then(MinorUnits::checked_sum)
        .and_then(|sum| sum.checked_add(order.shipping_fee))
        .and_then(|sum| sum.checked_add(order.tax_amount))
        .and_then(|sum| sum.checked_sub(order.discount_amount))
        .ok_or_else(|| out_of_range("order total"))?;
    if computed == order.total {
        Ok(())
    } else {
        Err(MarketplaceError::TotalMismatch { stored: order.total, computed })
    }
}
