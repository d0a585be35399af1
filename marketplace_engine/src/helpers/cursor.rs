use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mkt_api::errors::MarketplaceError;

/// Position in a newest-first listing: the `(created_at, id)` of the last row on the previous page.
///
/// On the wire it is an opaque token: URL-safe base64 of `{"timestamp": ..., "id": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub timestamp: DateTime<Utc>,
    pub id: i64,
}

impl PageCursor {
    pub fn new(timestamp: DateTime<Utc>, id: i64) -> Self {
        Self { timestamp, id }
    }

    pub fn encode(&self) -> String {
        // Serializing two plain fields cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::encode_config(json, base64::URL_SAFE_NO_PAD)
    }

    pub fn decode(token: &str) -> Result<Self, MarketplaceError> {
        let bytes = base64::decode_config(token.trim(), base64::URL_SAFE_NO_PAD)
            .map_err(|e| MarketplaceError::InvalidPageToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| MarketplaceError::InvalidPageToken(e.to_string()))
    }
}
