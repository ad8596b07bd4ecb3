//! Error types for the portal and resource services

use std::io;

use thiserror::Error;

/// Result type alias for the portal
pub type Result<T> = std::result::Result<T, Error>;

/// Portal errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bearer token rejected
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Network or non-2xx response from the identity provider or graph
    #[error("Upstream error from {context}: {detail}")]
    Upstream {
        /// Which upstream endpoint failed
        context: &'static str,
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error detail (response body or transport error)
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an upstream error for a named endpoint
    pub fn upstream(context: &'static str, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Upstream {
            context,
            status,
            detail: detail.into(),
        }
    }
}

/// Token verification failures, surfaced to the caller as HTTP 401.
///
/// These are terminal per request and never retried.
#[derive(Error, Debug)]
pub enum AuthError {
    /// `Authorization` header absent or not of the form `Bearer <token>`
    #[error("missing bearer token")]
    MissingToken,

    /// Token is not structurally a JWT, or its header lacks a `kid`
    #[error("malformed token")]
    MalformedToken,

    /// The token's `kid` is not in the provider's published key set
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// Signature, expiry, or algorithm check failed
    #[error("invalid signature")]
    InvalidSignature,
}

impl AuthError {
    /// Stable reason code used in 401 response bodies
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "MissingToken",
            Self::MalformedToken => "MalformedToken",
            Self::UnknownKey(_) => "UnknownKey",
            Self::InvalidSignature => "InvalidSignature",
        }
    }
}
