//! Microsoft Graph client — group-membership lookups with a bearer token

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// A directory object returned by a membership listing
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryObject {
    /// Human-readable name of the group or role
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    value: Vec<DirectoryObject>,
}

/// Thin client for the graph endpoints the portal consumes
pub struct GraphClient {
    http: Client,
    base_url: String,
}

impl GraphClient {
    /// Create a client for the given graph base URL
    #[must_use]
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// List the signed-in user's directory group memberships.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] on network failure or a non-2xx response.
    pub async fn member_groups(&self, access_token: &str) -> Result<Vec<DirectoryObject>> {
        let url = format!("{}/me/memberOf", self.base_url.trim_end_matches('/'));
        debug!(url = %url, "listing group memberships");

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::upstream("graph", None, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream("graph", Some(status.as_u16()), body));
        }

        let body: CollectionResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream("graph", None, e.to_string()))?;

        Ok(body.value)
    }
}
