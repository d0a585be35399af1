use log::*;
use rand::Rng;

use crate::{
    db_types::{Payment, PaymentProvider},
    mkt_api::errors::MarketplaceError,
    providers::reference::{ProviderReference, MOBILE_MONEY_A_PREFIX, MOBILE_MONEY_B_PREFIX},
};

/// A synchronous mobile money provider. Charges are confirmed in-process, so the returned reference is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobileMoneyGateway {
    provider: PaymentProvider,
}

fn random_suffix() -> String {
    let bytes: [u8; 12] = rand::thread_rng().gen();
    hex::encode(bytes)
}

impl MobileMoneyGateway {
    pub fn new(provider: PaymentProvider) -> Result<Self, MarketplaceError> {
        if !provider.is_synchronous() {
            return Err(MarketplaceError::ValidationError(format!("{provider} is not a mobile money provider")));
        }
        Ok(Self { provider })
    }

    pub fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn prefix(&self) -> &'static str {
        match self.provider {
            PaymentProvider::MobileMoneyB => MOBILE_MONEY_B_PREFIX,
            _ => MOBILE_MONEY_A_PREFIX,
        }
    }

    /// A fresh transaction reference in this provider's shape.
    pub fn new_reference(&self) -> String {
        format!("{}{}", self.prefix(), random_suffix())
    }

    /// Collects the payment. The mock provider approves every charge immediately.
    pub async fn charge(&self, payment: &Payment) -> Result<String, MarketplaceError> {
        let reference = payment.provider_ref.clone().unwrap_or_else(|| self.new_reference());
        debug!("💳 {} charged {} {} ({reference})", self.provider, payment.amount, payment.currency);
        Ok(reference)
    }

    pub async fn issue_refund(&self, payment: &Payment) -> Result<String, MarketplaceError> {
        let reference = payment.provider_ref.as_deref().unwrap_or_default();
        match ProviderReference::classify(reference)? {
            ProviderReference::MobileMoney { provider, .. } if provider == self.provider => {
                let refund_ref = format!("{}refund_{}", self.prefix(), random_suffix());
                debug!("💳 {} refunded {reference} as {refund_ref}", self.provider);
                Ok(refund_ref)
            },
            _ => Err(MarketplaceError::UnrecognizedReference(reference.to_string())),
        }
    }
}
