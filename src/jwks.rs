//! Signing-key discovery — fetches the provider's published key set
//!
//! Keys are refetched for every verification; there is no cache, retry, or
//! TTL. Rotation is picked up immediately at the cost of one network round
//! trip per verified request, and key-endpoint latency gates request latency
//! on the resource side.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// One published signing key
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKey {
    /// Key id, matched against the JWT header `kid`
    pub kid: String,
    /// Certificate chain, leaf first, each entry base64-encoded DER
    #[serde(default)]
    pub x5c: Vec<String>,
}

/// The provider's currently published key set
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKeys {
    /// Published keys, in provider order
    pub keys: Vec<SigningKey>,
}

impl SigningKeys {
    /// Find the key whose `kid` matches
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

/// Fetches the provider's key set on demand
pub struct KeySetResolver {
    http: Client,
    keys_url: String,
}

impl KeySetResolver {
    /// Create a resolver for the given discovery keys URL
    #[must_use]
    pub fn new(http: Client, keys_url: String) -> Self {
        Self { http, keys_url }
    }

    /// Fetch the current key set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] on network failure, a non-2xx response,
    /// or a malformed body.
    pub async fn fetch_keys(&self) -> Result<SigningKeys> {
        debug!(url = %self.keys_url, "fetching signing keys");

        let response = self
            .http
            .get(&self.keys_url)
            .send()
            .await
            .map_err(|e| Error::upstream("keys endpoint", None, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream("keys endpoint", Some(status.as_u16()), body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::upstream("keys endpoint", None, e.to_string()))
    }
}
