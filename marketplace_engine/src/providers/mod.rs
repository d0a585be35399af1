//! Payment provider adapters.
//!
//! Providers come in two flavours. The card network is asynchronous: checkout opens a hosted session and the result
//! arrives later by signed webhook. Mobile money providers are synchronous: the charge is confirmed in-process.
mod card_network;
mod mobile_money;
mod reference;

use std::collections::HashMap;

pub use card_network::{new_checkout_session, CardNetworkGateway, ORDER_ID_KEY, PAYMENT_ID_KEY};
pub use mobile_money::MobileMoneyGateway;
pub use reference::ProviderReference;

use crate::{
    db_types::{Order, OrderItem, Payment, PaymentProvider},
    mkt_api::errors::MarketplaceError,
    traits::CardNetworkClient,
};

pub enum Gateway<C> {
    Async(CardNetworkGateway<C>),
    Sync(MobileMoneyGateway),
}

/// How a checkout proceeds once the provider has been asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStart {
    /// The customer must finish paying on the provider's page. Confirmation arrives by webhook.
    Redirect { session_id: String, url: Option<String> },
    /// The provider confirmed the charge on the spot.
    Confirmed { reference: String },
}

impl<C: CardNetworkClient> Gateway<C> {
    pub fn provider(&self) -> PaymentProvider {
        match self {
            Gateway::Async(_) => PaymentProvider::CardNetwork,
            Gateway::Sync(mm) => mm.provider(),
        }
    }

    pub async fn create_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        payment: &Payment,
    ) -> Result<CheckoutStart, MarketplaceError> {
        match self {
            Gateway::Async(card) => {
                let session = card.create_checkout(order, items, payment).await?;
                Ok(CheckoutStart::Redirect { session_id: session.id, url: session.url })
            },
            Gateway::Sync(mm) => Ok(CheckoutStart::Confirmed { reference: mm.charge(payment).await? }),
        }
    }

    pub async fn issue_refund(&self, payment: &Payment) -> Result<String, MarketplaceError> {
        match self {
            Gateway::Async(card) => card.issue_refund(payment).await,
            Gateway::Sync(mm) => mm.issue_refund(payment).await,
        }
    }
}

/// The configured providers. A provider that is not registered is unavailable.
pub struct PaymentGateways<C> {
    gateways: HashMap<PaymentProvider, Gateway<C>>,
}

impl<C> Default for PaymentGateways<C> {
    fn default() -> Self {
        Self { gateways: HashMap::new() }
    }
}

impl<C> PaymentGateways<C> {
    pub fn with_card_network(mut self, gateway: CardNetworkGateway<C>) -> Self {
        self.gateways.insert(PaymentProvider::CardNetwork, Gateway::Async(gateway));
        self
    }

    pub fn with_mobile_money(mut self, gateway: MobileMoneyGateway) -> Self {
        self.gateways.insert(gateway.provider(), Gateway::Sync(gateway));
        self
    }

    /// Registers both mobile money providers.
    pub fn with_all_mobile_money(self) -> Result<Self, MarketplaceError> {
        Ok(self
            .with_mobile_money(MobileMoneyGateway::new(PaymentProvider::MobileMoneyA)?)
            .with_mobile_money(MobileMoneyGateway::new(PaymentProvider::MobileMoneyB)?))
    }

    pub fn gateway(&self, provider: PaymentProvider) -> Result<&Gateway<C>, MarketplaceError> {
        self.gateways.get(&provider).ok_or(MarketplaceError::ProviderNotAvailable(provider))
    }

    pub fn card_network(&self) -> Result<&CardNetworkGateway<C>, MarketplaceError> {
        match self.gateway(PaymentProvider::CardNetwork)? {
            Gateway::Async(card) => Ok(card),
            Gateway::Sync(_) => Err(MarketplaceError::ProviderNotAvailable(PaymentProvider::CardNetwork)),
        }
    }

    pub fn is_available(&self, provider: PaymentProvider) -> bool {
        self.gateways.contains_key(&provider)
    }
}
