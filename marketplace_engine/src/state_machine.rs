//! The order state machine.
//!
//! ```text
//! PENDING_PAYMENT ─► PAID ─► PROCESSING ─► PACKED ─┬─► SHIPPED ──────────► DELIVERED ─┐
//!        │             │                           └─► READY_FOR_PICKUP ─► PICKED_UP ─┤
//!        └─► CANCELED ◄┘                                                              ▼
//!                          REFUNDED ◄─ RETURNED ◄─ RETURN_APPROVED ◄─ RETURN_REQUESTED
//! ```
//!
//! Everything here is pure. The storage layer calls [`authorize`] and [`check_transition`] inside the transaction
//! that applies the change.
use crate::{
    db_types::{Actor, FulfillmentKind, Order, OrderStatusType},
    mkt_api::errors::MarketplaceError,
};

use OrderStatusType::*;

pub fn allowed_targets(from: OrderStatusType) -> &'static [OrderStatusType] {
    match from {
        PendingPayment => &[Paid, Canceled],
        Paid => &[Processing, Canceled],
        Processing => &[Packed],
        Packed => &[Shipped, ReadyForPickup],
        Shipped => &[Delivered],
        ReadyForPickup => &[PickedUp],
        Delivered => &[ReturnRequested],
        PickedUp => &[ReturnRequested],
        ReturnRequested => &[ReturnApproved],
        ReturnApproved => &[Returned],
        Returned => &[Refunded],
        Refunded | Canceled => &[],
    }
}

pub fn is_allowed(from: OrderStatusType, to: OrderStatusType) -> bool {
    allowed_targets(from).contains(&to)
}

/// Statuses that only make sense for one fulfillment kind.
fn fulfillment_allows(kind: FulfillmentKind, to: OrderStatusType) -> bool {
    match to {
        Shipped | Delivered => kind == FulfillmentKind::Shipping,
        ReadyForPickup | PickedUp => kind == FulfillmentKind::Pickup,
        _ => true,
    }
}

/// Statuses that are only ever entered by settlement, refunds or the return workflow.
pub fn is_system_only(to: OrderStatusType) -> bool {
    matches!(to, Paid | Refunded | ReturnRequested | ReturnApproved | Returned)
}

/// The status a rejected return sends the order back to.
pub fn completed_status(kind: FulfillmentKind) -> OrderStatusType {
    match kind {
        FulfillmentKind::Shipping => Delivered,
        FulfillmentKind::Pickup => PickedUp,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// The order is already in the requested status.
    NoOp,
    Apply,
}

/// Checks `order.status -> to` against the table and the order's fulfillment kind.
pub fn check_transition(order: &Order, to: OrderStatusType) -> Result<TransitionCheck, MarketplaceError> {
    if order.status == to {
        return Ok(TransitionCheck::NoOp);
    }
    if !is_allowed(order.status, to) {
        return Err(MarketplaceError::InvalidTransition { from: order.status, to });
    }
    if !fulfillment_allows(order.fulfillment, to) {
        return Err(MarketplaceError::FulfillmentMismatch { kind: order.fulfillment, to });
    }
    Ok(TransitionCheck::Apply)
}

/// Whether `actor` takes part in `order` at all. `vendor_owner` is the user id owning the order's vendor.
pub fn is_participant(actor: &Actor, order: &Order, vendor_owner: &str) -> bool {
    match actor {
        Actor::Customer(id) => *id == order.customer_id,
        Actor::Vendor(id) => id == vendor_owner,
        Actor::Operator(_) | Actor::System => true,
    }
}

/// Role rules for a requested status change.
///
/// * Customers may only cancel their own orders.
/// * Vendors may move their own orders forward, but never cancel them.
/// * Operators may request any change that is not reserved for the system.
/// * The system (payment and return callbacks, workers) bypasses role checks.
pub fn authorize(
    actor: &Actor,
    order: &Order,
    vendor_owner: &str,
    to: OrderStatusType,
) -> Result<(), MarketplaceError> {
    if !is_participant(actor, order, vendor_owner) {
        return Err(MarketplaceError::Forbidden(format!("{actor} has no access to order {}", order.id)));
    }
    match actor {
        Actor::System => Ok(()),
        _ if is_system_only(to) => {
            Err(MarketplaceError::Forbidden(format!("{to} is set by the payment and return workflows only")))
        },
        Actor::Customer(_) if to != Canceled => Err(MarketplaceError::Forbidden("Customers may only cancel".into())),
        Actor::Vendor(_) if to == Canceled => {
            Err(MarketplaceError::Forbidden("Vendors may not cancel orders".into()))
        },
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::MinorUnits;

    const ALL: [OrderStatusType; 13] = [
        PendingPayment,
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
        Refunded,
        Canceled,
    ];

    fn order(status: OrderStatusType, fulfillment: FulfillmentKind) -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            customer_id: "alice".into(),
            vendor_id: 7,
            status,
            currency: "KES".into(),
            subtotal: MinorUnits::from(1000),
            shipping_fee: MinorUnits::from(0),
            tax_amount: MinorUnits::from(0),
            discount_amount: MinorUnits::from(0),
            total: MinorUnits::from(1000),
            fulfillment,
            shipping_address_id: Some(1),
            pickup_location_id: None,
            promo_code: None,
            payment_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn table_is_exhaustive() {
        let mut allowed = 0;
        for from in ALL {
            for to in ALL {
                let o = order(from, FulfillmentKind::Shipping);
                match check_transition(&o, to) {
                    Ok(TransitionCheck::NoOp) => assert_eq!(from, to),
                    Ok(TransitionCheck::Apply) => {
                        assert!(is_allowed(from, to));
                        allowed += 1;
                    },
                    Err(MarketplaceError::InvalidTransition { .. }) => assert!(!is_allowed(from, to)),
                    Err(MarketplaceError::FulfillmentMismatch { .. }) => {
                        assert!(matches!(to, ReadyForPickup | PickedUp))
                    },
                    Err(e) => panic!("Unexpected error {e}"),
                }
            }
        }
        // 14 table edges, minus PACKED->READY_FOR_PICKUP and READY_FOR_PICKUP->PICKED_UP for a shipped order
        assert_eq!(allowed, 12);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_targets(Refunded).is_empty());
        assert!(allowed_targets(Canceled).is_empty());
        assert!(Refunded.is_terminal() && Canceled.is_terminal());
    }

    #[test]
    fn fulfillment_kind_restricts_branch() {
        let o = order(Packed, FulfillmentKind::Pickup);
        assert_eq!(check_transition(&o, ReadyForPickup).unwrap(), TransitionCheck::Apply);
        assert!(matches!(check_transition(&o, Shipped), Err(MarketplaceError::FulfillmentMismatch { .. })));
    }

    #[test]
    fn customers_may_only_cancel_their_own_orders() {
        let o = order(PendingPayment, FulfillmentKind::Shipping);
        let alice = Actor::Customer("alice".into());
        assert!(authorize(&alice, &o, "vendor-owner", Canceled).is_ok());
        assert!(authorize(&alice, &o, "vendor-owner", Processing).is_err());
        let bob = Actor::Customer("bob".into());
        assert!(authorize(&bob, &o, "vendor-owner", Canceled).is_err());
    }

    #[test]
    fn vendors_move_forward_but_never_cancel() {
        let o = order(Paid, FulfillmentKind::Shipping);
        let owner = Actor::Vendor("vendor-owner".into());
        assert!(authorize(&owner, &o, "vendor-owner", Processing).is_ok());
        assert!(authorize(&owner, &o, "vendor-owner", Canceled).is_err());
        let stranger = Actor::Vendor("someone-else".into());
        assert!(authorize(&stranger, &o, "vendor-owner", Processing).is_err());
    }

    #[test]
    fn settlement_statuses_are_reserved_for_the_system() {
        let o = order(PendingPayment, FulfillmentKind::Shipping);
        let op = Actor::Operator("ops".into());
        assert!(authorize(&op, &o, "vendor-owner", Paid).is_err());
        assert!(authorize(&op, &o, "vendor-owner", Canceled).is_ok());
        assert!(authorize(&Actor::System, &o, "vendor-owner", Paid).is_ok());
    }
}
