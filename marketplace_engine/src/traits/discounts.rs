use crate::db_types::MinorUnits;

/// Resolves a promotion code into a discount. Implementations are pure; checkout clamps whatever they return.
pub trait DiscountResolver: Send + Sync {
    fn resolve(&self, code: &str, order_total: MinorUnits, vendor_id: i64) -> MinorUnits;
}

/// Ignores every code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscounts;

impl DiscountResolver for NoDiscounts {
    fn resolve(&self, _code: &str, _order_total: MinorUnits, _vendor_id: i64) -> MinorUnits {
        MinorUnits::zero()
    }
}
