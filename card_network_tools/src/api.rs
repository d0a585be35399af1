use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::CardNetworkConfig,
    data_objects::{CheckoutSession, NewCheckoutSession, NewRefund, Refund},
    CardNetworkError,
};

#[derive(Clone)]
pub struct CardNetworkApi {
    config: CardNetworkConfig,
    client: Arc<Client>,
}

impl std::fmt::Debug for CardNetworkApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CardNetworkApi ({})", self.config.api_base)
    }
}

impl CardNetworkApi {
    pub fn new(config: CardNetworkConfig) -> Result<Self, CardNetworkError> {
        if !config.is_configured() {
            return Err(CardNetworkError::NotConfigured("The card network secret key is empty".into()));
        }
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut val = HeaderValue::from_str(&bearer).map_err(|e| CardNetworkError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert(AUTHORIZATION, val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CardNetworkError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &CardNetworkConfig {
        &self.config
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, CardNetworkError> {
        let url = self.url(path);
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| CardNetworkError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| CardNetworkError::RestResponseError(e.to_string()))?;
            Err(CardNetworkError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }

    /// Creates a hosted checkout session. The returned session id (`cs_...`) is what the marketplace stores as the
    /// payment's provider reference until the payment intent is known.
    pub async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> Result<CheckoutSession, CardNetworkError> {
        debug!("Creating checkout session for {} {}", session.line_items_total(), session.currency);
        let result = self.rest_query::<CheckoutSession, _>(Method::POST, "/v1/checkout/sessions", Some(session)).await?;
        info!("Created checkout session {}", result.id);
        Ok(result)
    }

    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, CardNetworkError> {
        let path = format!("/v1/checkout/sessions/{session_id}");
        debug!("Fetching checkout session {session_id}");
        let result = self.rest_query::<CheckoutSession, ()>(Method::GET, &path, None).await?;
        trace!("Fetched checkout session {session_id}: {result:?}");
        Ok(result)
    }

    pub async fn create_refund(&self, refund: &NewRefund) -> Result<Refund, CardNetworkError> {
        debug!("Requesting refund for {}", refund.target_description());
        let result = self.rest_query::<Refund, _>(Method::POST, "/v1/refunds", Some(refund)).await?;
        info!("Refund {} created with status {}", result.id, result.status);
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use mkt_common::Secret;

    use super::*;

    #[test]
    fn requires_secret_key() {
        let config = CardNetworkConfig::new("https://cards.local/", Secret::default(), Duration::from_secs(1));
        let err = CardNetworkApi::new(config).unwrap_err();
        assert!(matches!(err, CardNetworkError::NotConfigured(_)));
    }

    #[test]
    fn builds_urls_without_double_slashes() {
        let config =
            CardNetworkConfig::new("https://cards.local/", Secret::new("sk_test".into()), Duration::from_secs(1));
        let api = CardNetworkApi::new(config).unwrap();
        assert_eq!(api.url("/v1/refunds"), "https://cards.local/v1/refunds");
    }
}
