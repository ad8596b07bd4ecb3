//! Configuration management
//!
//! Settings come from an optional YAML file merged with `PORTAL_`-prefixed
//! environment variables (`__` as section separator). The bare `MICROSOFT_*`
//! variables used by existing deployments are honored as a fallback for the
//! identity provider section. All required provider settings are validated at
//! startup; a missing value is fatal and the process does not start.

use std::{env, net::SocketAddr, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default base URL for the Microsoft identity platform
pub const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Default base URL for Microsoft Graph
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Front-end portal service
    pub portal: PortalConfig,
    /// Resource API service
    pub resource: ResourceConfig,
    /// Identity provider registration
    pub microsoft: MicrosoftConfig,
}

/// Bind settings for the front-end portal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally reachable base URL, used as the post-logout redirect
    /// target. Derived from host/port when not set.
    pub public_url: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_url: None,
        }
    }
}

impl PortalConfig {
    /// Socket address to bind the portal to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid portal bind address: {e}")))
    }

    /// Externally reachable base URL of the portal
    #[must_use]
    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

/// Bind settings for the resource API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

impl ResourceConfig {
    /// Socket address to bind the resource API to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid resource bind address: {e}")))
    }
}

/// Microsoft Entra ID application registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrosoftConfig {
    /// Application (client) id
    pub client_id: String,
    /// Client secret for the confidential client
    pub client_secret: String,
    /// Redirect URI registered for the authorization-code flow
    pub redirect_uri: String,
    /// Directory (tenant) id
    pub tenant_id: String,
    /// Scope string requested on authorize and token calls
    pub scope: String,
    /// Base URL of the identity platform (overridable for tests)
    pub login_base: String,
    /// Base URL of Microsoft Graph (overridable for tests)
    pub graph_base: String,
}

impl Default for MicrosoftConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            tenant_id: String::new(),
            scope: "openid profile email".to_string(),
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            graph_base: DEFAULT_GRAPH_BASE.to_string(),
        }
    }
}

impl MicrosoftConfig {
    /// OAuth2 v2.0 base URL for this tenant
    #[must_use]
    pub fn oauth_base(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0",
            self.login_base.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Authorize endpoint (browser redirect target)
    #[must_use]
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.oauth_base())
    }

    /// Token endpoint (back-channel POST, form-urlencoded)
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/token", self.oauth_base())
    }

    /// Provider logout endpoint
    #[must_use]
    pub fn logout_endpoint(&self) -> String {
        format!("{}/logout", self.oauth_base())
    }

    /// Discovery keys endpoint, parameterized by the registered app id
    #[must_use]
    pub fn keys_endpoint(&self) -> String {
        format!(
            "{}/{}/discovery/keys?appid={}",
            self.login_base.trim_end_matches('/'),
            self.tenant_id,
            self.client_id
        )
    }

    /// Check that every required provider setting is present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("microsoft.client_id", &self.client_id),
            ("microsoft.client_secret", &self.client_secret),
            ("microsoft.redirect_uri", &self.redirect_uri),
            ("microsoft.tenant_id", &self.tenant_id),
            ("microsoft.scope", &self.scope),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("Missing required setting: {name}")));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from file and environment, failing fast on any
    /// missing provider setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or a required Microsoft setting is absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("PORTAL_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.merge_plain_env();
        config.microsoft.validate()?;

        Ok(config)
    }

    /// Fill empty provider fields from the bare `MICROSOFT_*` variables.
    fn merge_plain_env(&mut self) {
        fill_from_env(&mut self.microsoft.client_id, "MICROSOFT_CLIENT_ID");
        fill_from_env(&mut self.microsoft.client_secret, "MICROSOFT_CLIENT_SECRET");
        fill_from_env(&mut self.microsoft.redirect_uri, "MICROSOFT_REDIRECT_URI");
        fill_from_env(&mut self.microsoft.tenant_id, "MICROSOFT_TENANT_ID");
    }
}

fn fill_from_env(field: &mut String, var: &str) {
    if field.is_empty() {
        if let Ok(value) = env::var(var) {
            *field = value;
        }
    }
}
