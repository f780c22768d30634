//! Structural decoding of compact JWS tokens.
//!
//! Nothing here checks a signature; it only takes a token apart so the verifier can read
//! `kid`, `nonce` and `sub` before key resolution.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};

use crate::error::{id_token_error, Error, IdTokenErrorKind};

/// A compact JWS split into its decoded header and payload.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: Map<String, Value>,
    pub claims: Map<String, Value>,
    pub kid: String,
}

impl DecodedToken {
    /// A string claim from the payload.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

fn malformed(message: &str) -> Error {
    id_token_error(IdTokenErrorKind::InvalidTokenFormat, message)
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>, Error> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| malformed(&format!("Token {} is not base64url", name)))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(malformed(&format!("Token {} is not a JSON object", name))),
    }
}

/// Split `token` into header, payload and signature and decode the first two.
pub fn decode(token: &str) -> Result<DecodedToken, Error> {
    if token.trim().is_empty() {
        return Err(id_token_error(
            IdTokenErrorKind::InvalidTokenData,
            "ID token is empty",
        ));
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(malformed(&format!(
            "Expected 3 token parts, found {}",
            parts.len()
        )));
    }

    let header = decode_segment(parts[0], "header")?;
    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| malformed("Token header has no kid"))?
        .to_string();
    let claims = decode_segment(parts[1], "payload")?;

    Ok(DecodedToken {
        header,
        claims,
        kid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn segment(value: serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    #[test]
    fn test_decode_reads_header_and_claims() {
        let token = format!(
            "{}.{}.sig",
            segment(serde_json::json!({"alg": "RS256", "kid": "K"})),
            segment(serde_json::json!({"sub": "S", "nonce": "N"}))
        );

        let decoded = decode(&token).unwrap();
        assert_eq!(decoded.kid, "K");
        assert_eq!(decoded.claim_str("sub"), Some("S"));
        assert_eq!(decoded.claim_str("nonce"), Some("N"));
    }

    #[test]
    fn test_empty_token_is_invalid_data() {
        let err = decode("").unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::InvalidTokenData)
        );
    }

    #[test]
    fn test_wrong_part_count_is_invalid_format() {
        for token in ["MockIdToken", "a.b", "a.b.c.d"] {
            let err = decode(token).unwrap_err();
            assert_eq!(
                err.error_kind,
                ErrorKind::IdToken(IdTokenErrorKind::InvalidTokenFormat)
            );
        }
    }

    #[test]
    fn test_header_without_kid_is_invalid_format() {
        let token = format!(
            "{}.{}.sig",
            segment(serde_json::json!({"alg": "RS256"})),
            segment(serde_json::json!({"sub": "S"}))
        );
        let err = decode(&token).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::InvalidTokenFormat)
        );
    }

    #[test]
    fn test_non_json_payload_is_invalid_format() {
        let token = format!(
            "{}.{}.sig",
            segment(serde_json::json!({"kid": "K"})),
            URL_SAFE_NO_PAD.encode("not json")
        );
        let err = decode(&token).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::IdToken(IdTokenErrorKind::InvalidTokenFormat)
        );
    }
}
