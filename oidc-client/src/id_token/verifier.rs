//! ID token verification against the provider's JWKS.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::*;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;

use super::jws;
use crate::discovery::{Jwk, JwkSet};
use crate::error::{id_token_error, Error, ErrorKind, IdTokenErrorKind};

/// Identity asserted by an ID token that passed every check.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub nonce: String,
    /// Every claim of the verified token.
    pub claims: Map<String, Value>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct Verification {
    pub identity: VerifiedIdentity,
    /// False when the caller expected a different subject than the token asserts.
    pub user_matches: bool,
}

/// Compare two byte strings without short-circuiting on the first difference.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

fn audience(claims: &Map<String, Value>) -> Vec<String> {
    match claims.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Verifies ID tokens issued to one client by one provider.
pub struct IdTokenVerifier<'a> {
    pub issuer: &'a str,
    pub client_id: &'a str,
    pub jwks: Option<&'a JwkSet>,
    pub validate_lifetime: bool,
}

impl IdTokenVerifier<'_> {
    /// Verify `id_token` for the flow whose nonce is `expected_nonce`.
    ///
    /// Structural, nonce, key and signature failures are errors. A token for a different
    /// subject than `expected_user_id` verifies but reports `user_matches == false`.
    pub fn verify(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
        expected_user_id: Option<&str>,
    ) -> Result<Verification, Error> {
        let decoded = jws::decode(id_token)?;

        let nonce = decoded.claim_str("nonce").unwrap_or_default();
        let nonce_matches = match expected_nonce {
            Some(expected) if !expected.is_empty() => {
                constant_time_eq(nonce.as_bytes(), expected.as_bytes())
            }
            _ => false,
        };
        if !nonce_matches {
            warn!("Rejected ID token with a nonce not issued for this flow");
            return Err(id_token_error(
                IdTokenErrorKind::InvalidNonce,
                "ID token nonce does not match the flow nonce",
            ));
        }

        let user_matches = match expected_user_id {
            Some(expected) => decoded.claim_str("sub") == Some(expected),
            None => true,
        };

        let jwk = self.resolve_key(&decoded.kid)?;
        let key = Self::decoding_key(jwk)?;
        let claims = self.verify_signature(id_token, &key)?;

        let identity = VerifiedIdentity {
            subject: claims
                .get("sub")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            issuer: self.issuer.to_string(),
            audience: audience(&claims),
            nonce: nonce.to_string(),
            claims,
        };

        debug!(
            "Verified ID token for subject {} (kid {})",
            identity.subject, decoded.kid
        );

        Ok(Verification {
            identity,
            user_matches,
        })
    }

    fn resolve_key(&self, kid: &str) -> Result<&Jwk, Error> {
        let jwks = self.jwks.filter(|set| !set.keys.is_empty()).ok_or_else(|| {
            warn!("No signing keys available to verify ID token");
            id_token_error(IdTokenErrorKind::NoKeysFound, "Provider published no keys")
        })?;

        jwks.find(kid).ok_or_else(|| {
            warn!("No signing key with kid {}", kid);
            id_token_error(
                IdTokenErrorKind::NoKeysFound,
                &format!("No signing key with kid {}", kid),
            )
        })
    }

    fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, Error> {
        let unusable = || {
            id_token_error(
                IdTokenErrorKind::NoKeysFound,
                &format!("Key {:?} is not a usable RSA key", jwk.kid),
            )
        };

        if jwk.kty != "RSA" {
            return Err(unusable());
        }
        match (jwk.n.as_deref(), jwk.e.as_deref()) {
            (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e).map_err(|_| unusable()),
            _ => Err(unusable()),
        }
    }

    fn verify_signature(
        &self,
        id_token: &str,
        key: &DecodingKey,
    ) -> Result<Map<String, Value>, Error> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer]);
        validation.set_audience(&[self.client_id]);
        if self.validate_lifetime {
            validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        } else {
            validation.validate_exp = false;
            validation.set_required_spec_claims(&["iss", "aud"]);
        }

        decode::<Map<String, Value>>(id_token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!("ID token failed verification: {:?}", e);
                Error {
                    source: Some(Box::new(e)),
                    error_kind: ErrorKind::IdToken(IdTokenErrorKind::SignatureVerificationFailed),
                }
            })
    }
}
