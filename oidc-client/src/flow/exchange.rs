//! Authorization callback parsing and the back-channel code exchange.

use log::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{ClientAuthentication, ClientConfig};
use crate::error::{
    callback_error, token_error, CallbackErrorKind, Error, ErrorKind, TokenErrorKind,
};
use crate::http::BackchannelClient;

/// Query parameters the provider sends to the callback path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Callback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl Callback {
    /// Collect the callback fields from decoded query pairs; other parameters are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut callback = Callback::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "code" => &mut callback.code,
                "state" => &mut callback.state,
                "error" => &mut callback.error,
                "error_description" => &mut callback.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        callback
    }

    /// Parse a raw query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    /// Surface a provider supplied `error` verbatim.
    pub(crate) fn check_provider_error(&self) -> Result<(), Error> {
        match self.error.as_deref() {
            Some(error) if !error.is_empty() => {
                let message = match self.error_description.as_deref() {
                    Some(description) if !description.is_empty() => {
                        format!("{}: {}", error, description)
                    }
                    _ => error.to_string(),
                };
                warn!("Provider returned an error to the callback: {}", message);
                Err(callback_error(CallbackErrorKind::ProviderError, &message))
            }
            _ => Ok(()),
        }
    }

    /// The `code` and `state` pair, both required.
    pub(crate) fn code_and_state(&self) -> Result<(&str, &str), Error> {
        match (self.code.as_deref(), self.state.as_deref()) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => {
                Ok((code, state))
            }
            _ => {
                warn!("Rejected callback without code or state");
                Err(callback_error(
                    CallbackErrorKind::MalformedCallback,
                    "Callback must carry both code and state",
                ))
            }
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: SecretString,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    /// Lifetime of the access token in seconds from issuance.
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Form body of the code exchange.
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
}

/// Exchange an authorization code for tokens at `token_endpoint`.
///
/// Callback and state checks happen before this is called; this only talks to the provider.
pub async fn exchange_code(
    http: &BackchannelClient,
    config: &ClientConfig,
    token_endpoint: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse, Error> {
    let basic = config.client_authentication == ClientAuthentication::BasicAuth;
    let request = TokenExchangeRequest {
        grant_type: "authorization_code",
        code,
        redirect_uri,
        client_id: (!basic).then_some(config.client_id.as_str()),
        client_secret: (!basic).then(|| config.client_secret.expose_secret().as_str()),
    };

    debug!("Exchanging authorization code at {}", token_endpoint);

    let mut builder = http
        .post(token_endpoint)
        .timeout(config.backchannel_timeout)
        .form(&request);
    if basic {
        builder = builder.basic_auth(
            &config.client_id,
            Some(config.client_secret.expose_secret()),
        );
    }

    let response = builder.send().await.map_err(|e| {
        warn!("Failed to exchange authorization code: {:?}", e);
        Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Token(TokenErrorKind::TokenExchangeError),
        }
    })?;

    if response.status().is_success() {
        let tokens: TokenResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse token response: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Token(TokenErrorKind::TokenExchangeError),
            }
        })?;
        info!("Exchanged authorization code for tokens");
        Ok(tokens)
    } else {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        warn!("Token endpoint returned {}: {}", status, error_text);
        Err(token_error(
            TokenErrorKind::TokenExchangeError,
            &format!("Token endpoint returned {}: {}", status, error_text),
        ))
    }
}
