//! Shared fixtures for unit tests: an RSA signing key published in a JWKS, a second key the
//! provider never published, and helpers to mint ID tokens with them.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;

use crate::discovery::{Jwk, JwkSet, ProviderMetadata};

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const FOREIGN_KEY_PEM: &str = include_str!("../fixtures/foreign_key.pem");

/// Modulus of `SIGNING_KEY_PEM`, base64url encoded.
pub const SIGNING_KEY_N: &str = "nlNZthMht72EaAWkdXxjqBR08w8I_OkHzQFOYFaz7ifWP1-2wTA2JjgqsXSquh9z680IjQ4bilHktrSM0SnPIQZsRlbiWXEvQA4rYa7ZzEfto1Vgs9Ad_kjg4gQ_edu09dtvHBe5-PB-bZuwAbDYG4VhSz3xvQABqongSo7Kn59GnL8LBypg1R63J_qVoHUJ3rIBEi0sbTEauy4bRjSjq3pEChNLxjZ421G0bCW0NrXC6yO133wWM4_MwaR0iAC6eqnChDRPuFgA8s2ULItHx_bRlbQ04oSAAg8aoLeLxUXz4jImyI1_jiGqb04DoL-AZeFy5bVxt2CqsoCsUOUUUQ";
pub const SIGNING_KEY_E: &str = "AQAB";

pub const KID: &str = "K";
pub const ISSUER: &str = "https://issuer.example";
pub const CLIENT_ID: &str = "MockClient";

pub fn jwks() -> JwkSet {
    JwkSet {
        keys: vec![Jwk {
            kty: "RSA".to_string(),
            kid: Some(KID.to_string()),
            use_: Some("sig".to_string()),
            alg: Some("RS256".to_string()),
            n: Some(SIGNING_KEY_N.to_string()),
            e: Some(SIGNING_KEY_E.to_string()),
        }],
    }
}

/// Metadata pointing every endpoint at `base`.
pub fn metadata(base: &str) -> ProviderMetadata {
    ProviderMetadata {
        issuer: ISSUER.to_string(),
        authorization_endpoint: format!("{}/authorize", base),
        token_endpoint: format!("{}/token", base),
        userinfo_endpoint: format!("{}/user", base),
        jwks: Some(jwks()),
    }
}

/// Claims of a valid ID token for `sub` bound to `nonce`.
pub fn claims(sub: &str, nonce: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    serde_json::json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": sub,
        "nonce": nonce,
        "iat": now,
        "exp": now + 3600,
        "email": "noone@example.com",
    })
}

pub fn sign_with(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// An ID token signed by the published key.
pub fn id_token(sub: &str, nonce: &str) -> String {
    sign_with(SIGNING_KEY_PEM, KID, &claims(sub, nonce))
}

/// The URL query of an authorization redirect as a map.
pub fn query_of(url: &str) -> std::collections::HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}
