//! Claim set assembly from the userinfo endpoint and the token response.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use log::*;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use crate::error::{token_error, Error, ErrorKind, TokenErrorKind};
use crate::flow::TokenResponse;
use crate::http::BackchannelClient;

pub const ACCESS_TOKEN: &str = "access_token";
pub const EXPIRES_AT: &str = "expires_at";
pub const REFRESH_TOKEN: &str = "refresh_token";

/// A single claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub name: String,
    pub value: String,
}

/// Claims about the signed in user: userinfo claims first, then the token claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    claims: Vec<Claim>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.claims.push(Claim {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Value of the first claim called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Position of the first claim called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.claims.iter().position(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.claims.iter()
    }
}

/// Strings stay as they are, everything else is rendered as JSON text.
fn claim_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fetch the userinfo claims for `access_token`, in document order.
pub async fn fetch_userinfo(
    http: &BackchannelClient,
    userinfo_endpoint: &str,
    access_token: &str,
    timeout: std::time::Duration,
) -> Result<Map<String, Value>, Error> {
    let response = http
        .get(userinfo_endpoint)
        .timeout(timeout)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| {
            warn!("Failed to get user info: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Token(TokenErrorKind::UserInfoError),
            }
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        warn!("User info endpoint returned {}: {}", status, error_text);
        return Err(token_error(
            TokenErrorKind::UserInfoError,
            &format!("User info endpoint returned {}", status),
        ));
    }

    response.json::<Map<String, Value>>().await.map_err(|e| {
        warn!("Failed to parse user info: {:?}", e);
        Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Token(TokenErrorKind::UserInfoError),
        }
    })
}

/// The absolute expiry of a token issued at `issued_at`, as RFC 3339 UTC.
///
/// An `expires_in` that does not land on a representable date is a bad token response.
pub fn expires_at(issued_at: DateTime<Utc>, expires_in: i64) -> Result<String, Error> {
    TimeDelta::try_seconds(expires_in)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| {
            warn!("Token response has an out of range expires_in: {}", expires_in);
            token_error(
                TokenErrorKind::TokenExchangeError,
                &format!("expires_in {} is out of range", expires_in),
            )
        })
}

/// Check that the token response carries what claim assembly needs.
pub fn require_token_fields(tokens: &TokenResponse) -> Result<(), Error> {
    if tokens.id_token.trim().is_empty() || tokens.access_token.expose_secret().trim().is_empty()
    {
        return Err(token_error(
            TokenErrorKind::MissingTokenFields,
            "Token response needs both an ID token and an access token",
        ));
    }
    Ok(())
}

/// Merge userinfo claims with the synthetic token claims.
pub fn build_claim_set(
    userinfo: &Map<String, Value>,
    tokens: &TokenResponse,
    issued_at: DateTime<Utc>,
) -> Result<ClaimSet, Error> {
    let mut claims = ClaimSet::new();
    for (name, value) in userinfo {
        claims.push(name.as_str(), claim_value(value));
    }

    claims.push(ACCESS_TOKEN, tokens.access_token.expose_secret().as_str());
    claims.push(EXPIRES_AT, expires_at(issued_at, tokens.expires_in)?);
    if let Some(refresh_token) = tokens
        .refresh_token
        .as_ref()
        .map(|t| t.expose_secret())
        .filter(|t| !t.trim().is_empty())
    {
        claims.push(REFRESH_TOKEN, refresh_token.as_str());
    }

    Ok(claims)
}

/// Fetch userinfo and assemble the claim set for `tokens`.
pub async fn assemble_claims(
    http: &BackchannelClient,
    userinfo_endpoint: &str,
    tokens: &TokenResponse,
    timeout: std::time::Duration,
) -> Result<(Map<String, Value>, ClaimSet), Error> {
    require_token_fields(tokens)?;

    let userinfo = fetch_userinfo(
        http,
        userinfo_endpoint,
        tokens.access_token.expose_secret(),
        timeout,
    )
    .await?;
    let claims = build_claim_set(&userinfo, tokens, Utc::now())?;

    debug!("Assembled {} claims", claims.len());
    Ok((userinfo, claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::BackchannelClientBuilder;
    use chrono::TimeZone;
    use mockito::Server;
    use secrecy::SecretString;

    fn tokens(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: SecretString::new("MockToken".to_string()),
            id_token: "header.payload.signature".to_string(),
            refresh_token: refresh.map(|r| SecretString::new(r.to_string())),
            expires_in: 600,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    #[test]
    fn test_expires_at_is_absolute() {
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(expires_at(issued_at, 600).unwrap(), "2024-01-01T12:10:00Z");
        assert_eq!(expires_at(issued_at, -600).unwrap(), "2024-01-01T11:50:00Z");
    }

    #[test]
    fn test_out_of_range_expiry_is_an_error() {
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        for expires_in in [i64::MAX, i64::MIN] {
            let err = expires_at(issued_at, expires_in).unwrap_err();
            assert_eq!(
                err.error_kind,
                ErrorKind::Token(TokenErrorKind::TokenExchangeError)
            );
        }

        let mut huge = tokens(None);
        huge.expires_in = i64::MAX;
        assert!(build_claim_set(&Map::new(), &huge, issued_at).is_err());
    }

    #[test]
    fn test_userinfo_claims_come_first() {
        let userinfo: Map<String, Value> = serde_json::from_str(
            r#"{"sub":"noone@example.com","email":"noone@example.com","email_verified":true}"#,
        )
        .unwrap();
        let issued_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let claims = build_claim_set(&userinfo, &tokens(Some("MockRefresh")), issued_at).unwrap();

        assert_eq!(claims.get("sub"), Some("noone@example.com"));
        assert_eq!(claims.get("email_verified"), Some("true"));
        assert_eq!(claims.get(ACCESS_TOKEN), Some("MockToken"));
        assert_eq!(claims.get(EXPIRES_AT), Some("2024-01-01T12:10:00Z"));
        assert_eq!(claims.get(REFRESH_TOKEN), Some("MockRefresh"));

        let access = claims.position(ACCESS_TOKEN).unwrap();
        assert!(claims.position("sub").unwrap() < access);
        assert!(claims.position("email").unwrap() < access);
        assert_eq!(claims.position(EXPIRES_AT), Some(access + 1));
        assert_eq!(claims.position(REFRESH_TOKEN), Some(access + 2));
    }

    #[test]
    fn test_refresh_token_only_when_present() {
        let claims = build_claim_set(&Map::new(), &tokens(None), Utc::now()).unwrap();
        assert_eq!(claims.len(), 2);
        assert!(claims.get(REFRESH_TOKEN).is_none());
    }

    #[test]
    fn test_missing_token_fields() {
        let mut no_id_token = tokens(None);
        no_id_token.id_token = String::new();
        let err = require_token_fields(&no_id_token).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Token(TokenErrorKind::MissingTokenFields)
        );

        let mut no_access_token = tokens(None);
        no_access_token.access_token = SecretString::new(String::new());
        assert!(require_token_fields(&no_access_token).is_err());
    }

    #[tokio::test]
    async fn test_assemble_fetches_userinfo_with_bearer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer MockToken")
            .with_header("content-type", "application/json")
            .with_body(r#"{"sub":"noone@example.com"}"#)
            .create_async()
            .await;

        let http = BackchannelClientBuilder::new().build().unwrap();
        let (userinfo, claims) = assemble_claims(
            &http,
            &format!("{}/user", server.url()),
            &tokens(Some("MockRefresh")),
            std::time::Duration::from_secs(5),
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(userinfo["sub"], "noone@example.com");
        let first = claims.iter().next().unwrap();
        assert_eq!(first.name, "sub");
        assert_eq!(first.value, "noone@example.com");
    }

    #[tokio::test]
    async fn test_userinfo_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/user")
            .with_status(401)
            .create_async()
            .await;

        let http = BackchannelClientBuilder::new().build().unwrap();
        let err = assemble_claims(
            &http,
            &format!("{}/user", server.url()),
            &tokens(None),
            std::time::Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Token(TokenErrorKind::UserInfoError));
    }
}
