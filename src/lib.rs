//! Entra Portal Library
//!
//! Two-service OAuth2/OIDC authorization-code flow against Microsoft Entra
//! ID:
//!
//! - **Portal**: binds anonymous visitors to opaque cookie sessions, drives
//!   the redirect/code-exchange flow, and guards pages on session state.
//! - **Resource API**: independently re-verifies forwarded bearer tokens
//!   against the provider's rotating published key set before serving
//!   claims-derived JSON.
//!
//! Deliberate gaps, kept for compatibility with the observed flow: no token
//! refresh, no session expiry, no key-set caching, and no anti-forgery
//! `state` parameter on the authorize redirect.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod graph;
pub mod jwks;
pub mod portal;
pub mod resource;
pub mod session;
pub mod verify;

pub use error::{AuthError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
