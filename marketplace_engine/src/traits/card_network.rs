use card_network_tools::{CardNetworkApi, CardNetworkError, CheckoutSession, NewCheckoutSession, NewRefund, Refund};

/// The outbound calls the settlement core makes to the card network. [`CardNetworkApi`] is the production
/// implementation.
#[allow(async_fn_in_trait)]
pub trait CardNetworkClient {
    async fn create_checkout_session(&self, session: &NewCheckoutSession)
        -> Result<CheckoutSession, CardNetworkError>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, CardNetworkError>;

    async fn create_refund(&self, refund: &NewRefund) -> Result<Refund, CardNetworkError>;
}

impl CardNetworkClient for CardNetworkApi {
    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, CardNetworkError> {
        CardNetworkApi::create_checkout_session(self, session).await
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, CardNetworkError> {
        CardNetworkApi::retrieve_checkout_session(self, session_id).await
    }

    async fn create_refund(&self, refund: &NewRefund) -> Result<Refund, CardNetworkError> {
        CardNetworkApi::create_refund(self, refund).await
    }
}
