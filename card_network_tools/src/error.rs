use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CardNetworkError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The card network is not configured: {0}")]
    NotConfigured(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("The request to the card network timed out: {0}")]
    Timeout(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Webhook signature verification failed: {0}")]
    InvalidSignature(String),
    #[error("Webhook payload could not be understood: {0}")]
    MalformedWebhook(String),
}

impl CardNetworkError {
    /// Whether repeating the same call later could reasonably succeed (network trouble, provider 5xx, rate limits).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RestRequestError(_) | Self::RestResponseError(_) => true,
            Self::QueryError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CardNetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else {
            Self::RestRequestError(e.to_string())
        }
    }
}
