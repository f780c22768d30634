//! Client registration settings for the relying party.

use std::time::Duration;

use secrecy::SecretString;

use crate::http::BackchannelClient;

/// Scope requested when no scopes are configured.
pub const DEFAULT_SCOPE: &str = "openid profile email";
/// Path on the relying party where the provider redirects back to.
pub const DEFAULT_CALLBACK_PATH: &str = "/SigninMiracl";
/// Provider base address used unless overridden.
pub const DEFAULT_PROVIDER_URL: &str = "http://api.stg.miracl.net";

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthentication {
    /// `Authorization: Basic` header (`client_secret_basic`).
    #[default]
    BasicAuth,
    /// `client_id` and `client_secret` in the form body (`client_secret_post`).
    RequestBody,
}

/// Relying party configuration.
///
/// Immutable once bound to a client; a new authentication attempt with different settings
/// needs a `clear(true)` first.
#[derive(Clone)]
pub struct ClientConfig {
    /// Client identifier assigned by the provider.
    pub client_id: String,
    /// Client secret assigned by the provider.
    pub client_secret: SecretString,
    /// Requested scopes, joined with spaces.
    pub scopes: Vec<String>,
    /// Callback path appended to the relying party base URI.
    pub callback_path: String,
    /// Base address of the provider; discovery lives under `/.well-known`.
    pub provider_url: String,
    /// Timeout for discovery, token and userinfo requests.
    pub backchannel_timeout: Duration,
    /// Custom HTTP transport; a default one is built when absent.
    pub http_client: Option<BackchannelClient>,
    pub client_authentication: ClientAuthentication,
    /// Optional `access_type` request parameter, e.g. `offline`.
    pub access_type: Option<String>,
    /// Check `exp` on ID tokens. Only test setups turn this off.
    pub validate_lifetime: bool,
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            scopes: Vec::new(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            backchannel_timeout: Duration::from_secs(60),
            http_client: None,
            client_authentication: ClientAuthentication::default(),
            access_type: None,
            validate_lifetime: true,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_callback_path(mut self, callback_path: impl Into<String>) -> Self {
        self.callback_path = callback_path.into();
        self
    }

    pub fn with_provider_url(mut self, provider_url: impl Into<String>) -> Self {
        self.provider_url = provider_url.into();
        self
    }

    pub fn with_backchannel_timeout(mut self, timeout: Duration) -> Self {
        self.backchannel_timeout = timeout;
        self
    }

    pub fn with_http_client(mut self, http_client: BackchannelClient) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_client_authentication(mut self, style: ClientAuthentication) -> Self {
        self.client_authentication = style;
        self
    }

    pub fn with_access_type(mut self, access_type: impl Into<String>) -> Self {
        self.access_type = Some(access_type.into());
        self
    }

    /// Disable ID token expiry checks. Intended for tests with fixed tokens.
    pub fn without_lifetime_validation(mut self) -> Self {
        self.validate_lifetime = false;
        self
    }

    /// The space separated scope parameter.
    pub fn scope(&self) -> String {
        let scope = self
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if scope.is_empty() {
            DEFAULT_SCOPE.to_string()
        } else {
            scope
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("scopes", &self.scopes)
            .field("callback_path", &self.callback_path)
            .field("provider_url", &self.provider_url)
            .field("backchannel_timeout", &self.backchannel_timeout)
            .field("custom_http_client", &self.http_client.is_some())
            .field("client_authentication", &self.client_authentication)
            .field("access_type", &self.access_type)
            .field("validate_lifetime", &self.validate_lifetime)
            .finish()
    }
}
