//! Bearer token verification tests
//!
//! Builds a fake identity provider — an RSA keypair, a self-signed
//! certificate published as `x5c` on a mock keys endpoint — and exercises
//! the full verification pipeline, both directly and through the resource
//! service's HTTP surface.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{Json, Router, http::StatusCode, routing::get};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pretty_assertions::assert_eq;
use serde_json::json;

use entra_portal::{
    AuthError, Error,
    jwks::KeySetResolver,
    resource::{ResourceState, resource_router},
    verify::TokenVerifier,
};

/// A fake identity provider: signing key plus the key set it publishes.
struct TestIdp {
    jwks: serde_json::Value,
    encoding_key: EncodingKey,
}

fn test_idp(kid: &str) -> TestIdp {
    let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256).unwrap();
    let cert = rcgen::CertificateParams::new(vec!["idp.test.local".to_string()])
        .unwrap()
        .self_signed(&key_pair)
        .unwrap();

    let x5c = STANDARD.encode(cert.der().as_ref());
    let jwks = json!({
        "keys": [
            {"kty": "RSA", "use": "sig", "kid": kid, "x5c": [x5c]}
        ]
    });
    let encoding_key = EncodingKey::from_rsa_pem(key_pair.serialize_pem().as_bytes()).unwrap();

    TestIdp { jwks, encoding_key }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .try_into()
        .unwrap()
}

fn sign_token(idp: &TestIdp, kid: &str, name: &str, exp_offset: i64) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let claims = json!({
        "name": name,
        "sub": "user-1",
        "preferred_username": "user@example.com",
        "exp": now_secs() + exp_offset,
    });
    jsonwebtoken::encode(&header, &claims, &idp.encoding_key).unwrap()
}

/// Serve a router on an ephemeral port; returns its base URL.
async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Mock discovery keys endpoint; returns the full keys URL.
async fn spawn_keys_endpoint(jwks: serde_json::Value) -> String {
    let app = Router::new().route(
        "/discovery/keys",
        get(move || {
            let jwks = jwks.clone();
            async move { Json(jwks) }
        }),
    );
    format!("{}/discovery/keys", spawn(app).await)
}

fn verifier(keys_url: String) -> TokenVerifier {
    TokenVerifier::new(KeySetResolver::new(reqwest::Client::new(), keys_url))
}

// ── Verifier pipeline ─────────────────────────────────────────────────────

#[tokio::test]
async fn valid_token_yields_the_signer_claims() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let token = sign_token(&idp, "key-1", "Alice", 3600);

    let claims = verifier(keys_url)
        .verify(Some(&format!("Bearer {token}")))
        .await
        .unwrap();

    assert_eq!(claims.name.as_deref(), Some("Alice"));
    assert_eq!(claims.sub.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn mutated_payload_fails_with_invalid_signature() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;

    // Splice Mallory's payload under Alice's signature.
    let alice = sign_token(&idp, "key-1", "Alice", 3600);
    let mallory = sign_token(&idp, "key-1", "Mallory", 3600);
    let alice_parts: Vec<&str> = alice.split('.').collect();
    let mallory_parts: Vec<&str> = mallory.split('.').collect();
    let forged = format!("{}.{}.{}", alice_parts[0], mallory_parts[1], alice_parts[2]);

    let err = verifier(keys_url)
        .verify(Some(&format!("Bearer {forged}")))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::InvalidSignature)));
}

#[tokio::test]
async fn unknown_kid_fails_with_unknown_key() {
    let idp = test_idp("key-y");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let token = sign_token(&idp, "key-x", "Alice", 3600);

    let err = verifier(keys_url)
        .verify(Some(&format!("Bearer {token}")))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::UnknownKey(kid)) if kid == "key-x"));
}

#[tokio::test]
async fn missing_or_non_bearer_header_fails_with_missing_token() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let verifier = verifier(keys_url);

    let err = verifier.verify(None).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::MissingToken)));

    let err = verifier.verify(Some("Basic dXNlcjpwYXNz")).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::MissingToken)));
}

#[tokio::test]
async fn structurally_broken_token_fails_with_malformed_token() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let verifier = verifier(keys_url);

    let err = verifier.verify(Some("Bearer not-a-jwt")).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::MalformedToken)));

    // A valid JWT without a kid header claim is also unusable.
    let idp2 = test_idp("unused");
    let mut header = Header::new(Algorithm::RS256);
    header.kid = None;
    let token = jsonwebtoken::encode(
        &header,
        &json!({"exp": now_secs() + 3600}),
        &idp2.encoding_key,
    )
    .unwrap();
    let err = verifier
        .verify(Some(&format!("Bearer {token}")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::MalformedToken)));
}

#[tokio::test]
async fn non_rs256_algorithm_is_rejected() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;

    // ES256-signed token declaring the published kid.
    let ec_key = rcgen::KeyPair::generate().unwrap();
    let ec_encoding_key = EncodingKey::from_ec_pem(ec_key.serialize_pem().as_bytes()).unwrap();
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some("key-1".to_string());
    let token = jsonwebtoken::encode(
        &header,
        &json!({"name": "Alice", "exp": now_secs() + 3600}),
        &ec_encoding_key,
    )
    .unwrap();

    let err = verifier(keys_url)
        .verify(Some(&format!("Bearer {token}")))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::InvalidSignature)));
}

#[tokio::test]
async fn expired_token_fails_with_invalid_signature() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let token = sign_token(&idp, "key-1", "Alice", -3600);

    let err = verifier(keys_url)
        .verify(Some(&format!("Bearer {token}")))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::InvalidSignature)));
}

#[tokio::test]
async fn unreachable_keys_endpoint_is_an_upstream_error() {
    let idp = test_idp("key-1");
    let token = sign_token(&idp, "key-1", "Alice", 3600);

    // Nothing listens on port 1.
    let err = verifier("http://127.0.0.1:1/discovery/keys".to_string())
        .verify(Some(&format!("Bearer {token}")))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Upstream { .. }));
}

// ── Resource service surface ──────────────────────────────────────────────

async fn spawn_resource(keys_url: String) -> String {
    let state = Arc::new(ResourceState {
        verifier: verifier(keys_url),
    });
    spawn(resource_router(state)).await
}

#[tokio::test]
async fn resource_serves_claims_for_a_valid_token() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let base = spawn_resource(keys_url).await;
    let token = sign_token(&idp, "key-1", "Alice", 3600);

    let response = reqwest::Client::new()
        .get(format!("{base}/api/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Alice");
    assert_eq!(body["preferred_username"], "user@example.com");
}

#[tokio::test]
async fn resource_rejects_requests_without_a_token() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let base = spawn_resource(keys_url).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/api/me"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "MissingToken");
}

#[tokio::test]
async fn resource_rejects_a_token_signed_by_an_unpublished_key() {
    let idp = test_idp("key-y");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let base = spawn_resource(keys_url).await;
    let token = sign_token(&idp, "key-x", "Alice", 3600);

    let response = reqwest::Client::new()
        .get(format!("{base}/api/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "UnknownKey");
}

#[tokio::test]
async fn resource_root_is_public() {
    let idp = test_idp("key-1");
    let keys_url = spawn_keys_endpoint(idp.jwks.clone()).await;
    let base = spawn_resource(keys_url).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn resource_maps_keys_endpoint_failure_to_bad_gateway() {
    let keys = spawn(Router::new().route(
        "/discovery/keys",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
    ))
    .await;
    let base = spawn_resource(format!("{keys}/discovery/keys")).await;

    let idp = test_idp("key-1");
    let token = sign_token(&idp, "key-1", "Alice", 3600);

    let response = reqwest::Client::new()
        .get(format!("{base}/api/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
