//! Authorization-code flow against the identity provider
//!
//! Builds the authorize redirect, exchanges the returned code for tokens,
//! and builds the provider logout redirect. The returned tokens are not
//! validated here — verification happens only on the resource side when the
//! bearer token is presented.

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::MicrosoftConfig;
use crate::{Error, Result};

/// Tokens returned by the provider token endpoint.
///
/// Referenced exactly once, to populate the caller's session.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBundle {
    /// Bearer credential for the resource service and graph calls
    pub access_token: String,
    /// Refresh token (stored but never used; refresh is out of scope)
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OIDC ID token
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Orchestrates the redirect-to-provider and code-exchange steps
pub struct AuthFlow {
    http: Client,
    config: MicrosoftConfig,
}

impl AuthFlow {
    /// Create a flow for the configured app registration
    #[must_use]
    pub fn new(http: Client, config: MicrosoftConfig) -> Self {
        Self { http, config }
    }

    /// Build the authorize-endpoint redirect URL.
    ///
    /// No anti-forgery `state` parameter is sent — the upstream flow never
    /// carried one, and adding it would break compatibility testing against
    /// the observed behavior.
    pub fn authorize_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.authorize_endpoint())
            .map_err(|e| Error::Config(format!("Invalid authorize endpoint: {e}")))?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("response_type", "code");
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("response_mode", "query");
            params.append_pair("scope", &self.config.scope);
        }

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] on network failure or a non-2xx response
    /// from the token endpoint. Never retried.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenBundle> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("client_id", self.config.client_id.as_str());
        params.insert("code", code);
        params.insert("redirect_uri", self.config.redirect_uri.as_str());
        params.insert("client_secret", self.config.client_secret.as_str());
        params.insert("scope", self.config.scope.as_str());

        let response = self
            .http
            .post(self.config.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::upstream("token endpoint", None, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream("token endpoint", Some(status.as_u16()), body));
        }

        let bundle: TokenBundle = response
            .json()
            .await
            .map_err(|e| Error::upstream("token endpoint", None, e.to_string()))?;

        debug!("authorization code exchanged");
        Ok(bundle)
    }

    /// Build the provider logout redirect URL
    pub fn logout_url(&self, post_logout_redirect: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.logout_endpoint())
            .map_err(|e| Error::Config(format!("Invalid logout endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", post_logout_redirect);
        Ok(url)
    }
}
