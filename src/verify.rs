//! Bearer token verification against the provider's published keys
//!
//! # Verification flow
//!
//! 1. Split the `Authorization` header; require a `Bearer` scheme.
//! 2. Decode the JWT header (no verification) to extract `kid`.
//! 3. Fetch the provider key set and scan for the matching `kid`.
//! 4. Rebuild a PEM certificate from the key's `x5c[0]` entry and extract
//!    the RSA public key from it.
//! 5. Verify signature and expiry with exactly `RS256`; any other declared
//!    algorithm is rejected.
//!
//! Claims read during the untrusted header peek are never returned to
//! callers — only the claim set produced by the verified decode is.

use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::jwks::{KeySetResolver, SigningKey};
use crate::{Error, Result};

/// Claims extracted from a verified access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Display name — the claim consumed downstream
    #[serde(default)]
    pub name: Option<String>,
    /// Subject (opaque user id)
    #[serde(default)]
    pub sub: Option<String>,
    /// Preferred username, usually the sign-in email
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Expiry, seconds since the epoch; checked during verification
    pub exp: u64,
}

/// Verifies bearer tokens issued by the identity provider
pub struct TokenVerifier {
    resolver: KeySetResolver,
}

impl TokenVerifier {
    /// Create a verifier backed by the given key resolver
    #[must_use]
    pub fn new(resolver: KeySetResolver) -> Self {
        Self { resolver }
    }

    /// Verify the `Authorization` header value and return the claims.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] for rejections (missing/malformed token,
    /// unknown key, bad signature) and [`Error::Upstream`] when the key
    /// endpoint is unreachable or returns an unusable key.
    pub async fn verify(&self, authorization: Option<&str>) -> Result<Claims> {
        let token = bearer_token(authorization).ok_or(AuthError::MissingToken)?;

        // Untrusted peek: structural decode of the header for `kid` only.
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            debug!(error = %e, "token failed structural decode");
            AuthError::MalformedToken
        })?;
        let kid = header.kid.ok_or(AuthError::MalformedToken)?;

        let keys = self.resolver.fetch_keys().await?;
        let key = keys
            .find(&kid)
            .ok_or_else(|| AuthError::UnknownKey(kid.clone()))?;

        // RS256 only — no algorithm negotiation.
        if header.alg != Algorithm::RS256 {
            warn!(alg = ?header.alg, "token declared a non-RS256 algorithm");
            return Err(AuthError::InvalidSignature.into());
        }

        let decoding_key = decoding_key_from_x5c(key)?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Audience and issuer are not checked; signature and expiry only.
        validation.validate_aud = false;

        let data: TokenData<Claims> = jsonwebtoken::decode(token, &decoding_key, &validation)
            .map_err(|e| {
                debug!(kid = %kid, error = %e, "signature verification failed");
                AuthError::InvalidSignature
            })?;

        Ok(data.claims)
    }
}

/// Extract the token from a `Bearer` authorization header value
fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let value = authorization?;
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

/// Rebuild a PEM certificate from one base64 `x5c` chain entry
fn pem_from_x5c(x5c: &str) -> String {
    let mut pem = String::with_capacity(x5c.len() + 64);
    pem.push_str("-----BEGIN CERTIFICATE-----\n");
    for chunk in x5c.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Build a decoding key from the leaf certificate of a published key.
///
/// A key without a usable certificate is a provider-side problem, reported
/// as [`Error::Upstream`] rather than a token rejection.
fn decoding_key_from_x5c(key: &SigningKey) -> Result<DecodingKey> {
    let leaf = key.x5c.first().ok_or_else(|| {
        Error::upstream(
            "keys endpoint",
            None,
            format!("key {} has no certificate chain", key.kid),
        )
    })?;

    let pem = pem_from_x5c(leaf);
    let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).map_err(|e| {
        Error::upstream(
            "keys endpoint",
            None,
            format!("invalid certificate for key {}: {e}", key.kid),
        )
    })?;
    let cert = parsed.parse_x509().map_err(|e| {
        Error::upstream(
            "keys endpoint",
            None,
            format!("invalid certificate for key {}: {e}", key.kid),
        )
    })?;

    // The BIT STRING inside SubjectPublicKeyInfo is the PKCS#1 RSAPublicKey.
    let spki = cert.public_key();
    Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data))
}
