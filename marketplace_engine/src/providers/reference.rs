//! Provider references encode what they point at in their prefix. Refund routing is the only consumer.
use crate::{db_types::PaymentProvider, mkt_api::errors::MarketplaceError};

pub const CHECKOUT_SESSION_PREFIX: &str = "cs_";
pub const PAYMENT_INTENT_PREFIX: &str = "pi_";
pub const CHARGE_PREFIX: &str = "ch_";
pub const MOBILE_MONEY_A_PREFIX: &str = "mma_";
pub const MOBILE_MONEY_B_PREFIX: &str = "mmb_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderReference<'a> {
    CheckoutSession(&'a str),
    PaymentIntent(&'a str),
    Charge(&'a str),
    MobileMoney { provider: PaymentProvider, reference: &'a str },
}

impl<'a> ProviderReference<'a> {
    pub fn classify(reference: &'a str) -> Result<Self, MarketplaceError> {
        let has_body = |prefix: &str| reference.len() > prefix.len() && reference.starts_with(prefix);
        if has_body(CHECKOUT_SESSION_PREFIX) {
            Ok(Self::CheckoutSession(reference))
        } else if has_body(PAYMENT_INTENT_PREFIX) {
            Ok(Self::PaymentIntent(reference))
        } else if has_body(CHARGE_PREFIX) {
            Ok(Self::Charge(reference))
        } else if has_body(MOBILE_MONEY_A_PREFIX) {
            Ok(Self::MobileMoney { provider: PaymentProvider::MobileMoneyA, reference })
        } else if has_body(MOBILE_MONEY_B_PREFIX) {
            Ok(Self::MobileMoney { provider: PaymentProvider::MobileMoneyB, reference })
        } else {
            Err(MarketplaceError::UnrecognizedReference(reference.to_string()))
        }
    }

    pub fn provider(&self) -> PaymentProvider {
        match self {
            Self::CheckoutSession(_) | Self::PaymentIntent(_) | Self::Charge(_) => PaymentProvider::CardNetwork,
            Self::MobileMoney { provider, .. } => *provider,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shapes() {
        assert_eq!(ProviderReference::classify("pi_123").unwrap(), ProviderReference::PaymentIntent("pi_123"));
        assert_eq!(ProviderReference::classify("ch_9").unwrap(), ProviderReference::Charge("ch_9"));
        let session = ProviderReference::classify("cs_test_a1").unwrap();
        assert_eq!(session, ProviderReference::CheckoutSession("cs_test_a1"));
        let mm = ProviderReference::classify("mmb_00ff").unwrap();
        assert_eq!(mm.provider(), PaymentProvider::MobileMoneyB);
    }

    #[test]
    fn unrecognized_shapes_are_rejected() {
        for reference in ["", "pi_", "py_123", "PI_123", "txn-42"] {
            let err = ProviderReference::classify(reference).unwrap_err();
            assert!(matches!(err, MarketplaceError::UnrecognizedReference(_)), "{reference}");
        }
    }
}
