//! Authorization request construction.

use url::Url;

use super::state;
use crate::config::ClientConfig;
use crate::discovery::ProviderMetadata;
use crate::error::{config_error, discovery_error, ConfigErrorKind, DiscoveryErrorKind, Error};

/// Authorization request with URL and the values that arm the flow.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Authorization URL to redirect the user to.
    pub url: String,
    /// CSRF state parameter for validation.
    pub state: String,
    /// Nonce the ID token has to echo back.
    pub nonce: String,
    /// Redirect URI registered for this attempt.
    pub callback_url: String,
}

/// Check that `base_uri` is a well formed absolute or relative URI reference.
fn validate_base_uri(base_uri: &str) -> Result<(), Error> {
    if base_uri.trim().is_empty() {
        return Err(config_error(
            ConfigErrorKind::InvalidArgument,
            "Base URI must not be empty",
        ));
    }

    let parsed = match Url::parse(base_uri) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://relative.invalid")
            .and_then(|root| root.join(base_uri))
            .map(|_| ()),
        other => other.map(|_| ()),
    };

    if base_uri.chars().any(char::is_whitespace) || parsed.is_err() {
        return Err(config_error(
            ConfigErrorKind::InvalidArgument,
            &format!("Base URI is not a well formed URI: {}", base_uri),
        ));
    }

    Ok(())
}

/// The redirect URI for a relying party rooted at `base_uri`.
pub fn callback_url(base_uri: &str, callback_path: &str) -> String {
    format!("{}{}", base_uri.trim_end_matches('/'), callback_path)
}

/// Build an authorization request with a fresh nonce, and a fresh state unless the caller
/// supplies its own anti-forgery value.
pub fn build_authorization_request(
    base_uri: &str,
    config: &ClientConfig,
    metadata: &ProviderMetadata,
    state_override: Option<&str>,
) -> Result<AuthorizationRequest, Error> {
    validate_base_uri(base_uri)?;

    let callback_url = callback_url(base_uri, &config.callback_path);
    let state = match state_override {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => state::generate_state(),
    };
    let nonce = state::generate_nonce();

    let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|_| {
        discovery_error(
            DiscoveryErrorKind::InvalidDocument,
            &format!(
                "Authorization endpoint is not a valid URL: {}",
                metadata.authorization_endpoint
            ),
        )
    })?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scope())
            .append_pair("redirect_uri", &callback_url)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);
        if let Some(access_type) = config.access_type.as_deref() {
            query.append_pair("access_type", access_type);
        }
    }

    Ok(AuthorizationRequest {
        url: url.to_string(),
        state,
        nonce,
        callback_url,
    })
}
