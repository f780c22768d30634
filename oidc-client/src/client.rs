//! The relying party client driving one authentication flow at a time.

use log::*;

use crate::claims::{self, ClaimSet};
use crate::config::ClientConfig;
use crate::discovery::{DiscoveryCache, ProviderMetadata};
use crate::error::{
    callback_error, config_error, token_error, CallbackErrorKind, ConfigErrorKind, Error,
    TokenErrorKind,
};
use crate::flow::{build_authorization_request, exchange_code, Callback, FlowState, TokenResponse};
use crate::http::{BackchannelClient, BackchannelClientBuilder};
use crate::id_token::{IdTokenVerifier, VerifiedIdentity};
use crate::session::{Identity, Phase, Session};

fn not_configured() -> Error {
    config_error(
        ConfigErrorKind::NotConfigured,
        "Client has no configuration bound",
    )
}

/// OpenID Connect relying party for a single user flow.
///
/// Every mutating call takes `&mut self`; a host serving many users keeps one client per flow.
#[derive(Default)]
pub struct Client {
    config: Option<ClientConfig>,
    http: Option<BackchannelClient>,
    discovery: DiscoveryCache,
    flow: FlowState,
    session: Session,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    /// Use statically configured provider metadata instead of discovery.
    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.discovery = DiscoveryCache::preloaded(metadata);
        self
    }

    /// Bind a configuration, e.g. after `clear(true)` dropped the previous one.
    pub fn configure(&mut self, config: ClientConfig) {
        self.config = Some(config);
        self.http = None;
    }

    pub fn config(&self) -> Option<&ClientConfig> {
        self.config.as_ref()
    }

    pub fn metadata(&self) -> Option<&ProviderMetadata> {
        self.discovery.get()
    }

    fn http_for(
        slot: &mut Option<BackchannelClient>,
        config: &ClientConfig,
    ) -> Result<BackchannelClient, Error> {
        if let Some(http) = slot {
            return Ok(http.clone());
        }

        let http = match &config.http_client {
            Some(custom) => custom.clone(),
            None => BackchannelClientBuilder::new()
                .with_timeout(config.backchannel_timeout)
                .build()?,
        };
        *slot = Some(http.clone());
        Ok(http)
    }

    /// Load the provider metadata, once per client.
    pub async fn load_metadata(&mut self) -> Result<&ProviderMetadata, Error> {
        let config = self.config.as_ref().ok_or_else(not_configured)?;
        let http = Self::http_for(&mut self.http, config)?;
        self.discovery
            .load(&http, &config.provider_url, config.backchannel_timeout)
            .await
    }

    /// Arm a new flow and return the URL to send the user to.
    pub async fn build_authorization_url(
        &mut self,
        base_uri: &str,
        state_override: Option<&str>,
    ) -> Result<String, Error> {
        let config = self.config.as_ref().ok_or_else(not_configured)?;
        let http = Self::http_for(&mut self.http, config)?;
        let metadata = self
            .discovery
            .load(&http, &config.provider_url, config.backchannel_timeout)
            .await?;

        let request = build_authorization_request(base_uri, config, metadata, state_override)?;
        self.flow
            .arm(request.state, request.nonce, request.callback_url);
        self.session.phase = Phase::AuthorizationRequested;

        debug!("Armed authorization flow for client {}", config.client_id);
        Ok(request.url)
    }

    /// Validate the callback and exchange its code for tokens.
    ///
    /// The returned tokens are not trusted until [`Client::verify`] accepts them.
    pub async fn exchange(
        &mut self,
        callback: &Callback,
        redirect_uri: Option<&str>,
    ) -> Result<TokenResponse, Error> {
        let config = self.config.as_ref().ok_or_else(not_configured)?;
        self.session.phase = Phase::CallbackReceived;

        callback.check_provider_error()?;
        let (code, returned_state) = callback.code_and_state()?;

        if !self.flow.take_state_if_matches(returned_state) {
            warn!("Rejected callback - invalid anti-forgery state");
            self.session.phase = Phase::CsrfRejected;
            return Err(callback_error(
                CallbackErrorKind::CsrfMismatch,
                "Returned state does not match the authorization request",
            ));
        }

        let redirect_uri = redirect_uri
            .filter(|uri| !uri.is_empty())
            .or_else(|| self.flow.callback_url().filter(|uri| !uri.is_empty()))
            .map(str::to_string)
            .ok_or_else(|| {
                callback_error(
                    CallbackErrorKind::MissingRedirectUri,
                    "No redirect URI given and none recorded for this flow",
                )
            })?;

        let http = Self::http_for(&mut self.http, config)?;
        let metadata = self
            .discovery
            .load(&http, &config.provider_url, config.backchannel_timeout)
            .await?;
        let token_endpoint = metadata.token_endpoint.clone();

        let tokens = exchange_code(&http, config, &token_endpoint, code, &redirect_uri).await?;
        self.session.phase = Phase::TokensExchanged;
        Ok(tokens)
    }

    async fn verify_identity(
        &mut self,
        tokens: &TokenResponse,
        expected_user_id: Option<&str>,
    ) -> Result<Option<VerifiedIdentity>, Error> {
        let config = self.config.as_ref().ok_or_else(not_configured)?;
        let http = Self::http_for(&mut self.http, config)?;
        let metadata = self
            .discovery
            .load(&http, &config.provider_url, config.backchannel_timeout)
            .await?;

        let verifier = IdTokenVerifier {
            issuer: &metadata.issuer,
            client_id: &config.client_id,
            jwks: metadata.jwks.as_ref(),
            validate_lifetime: config.validate_lifetime,
        };

        let verification = match verifier.verify(&tokens.id_token, self.flow.nonce(), expected_user_id)
        {
            Ok(verification) => verification,
            Err(e) => {
                self.session.phase = Phase::IdTokenRejected;
                return Err(e);
            }
        };

        if !verification.user_matches {
            warn!(
                "ID token subject {} is not the expected user",
                verification.identity.subject
            );
            return Ok(None);
        }

        info!("Accepted ID token for subject {}", verification.identity.subject);
        self.session
            .accept(tokens.clone(), verification.identity.clone());
        Ok(Some(verification.identity))
    }

    /// Verify the ID token of `tokens` and, on success, accept them for this session.
    ///
    /// Returns false when the token is valid but asserts a different user than
    /// `expected_user_id`.
    pub async fn verify(
        &mut self,
        tokens: &TokenResponse,
        expected_user_id: Option<&str>,
    ) -> Result<bool, Error> {
        Ok(self
            .verify_identity(tokens, expected_user_id)
            .await?
            .is_some())
    }

    /// Fetch userinfo and build the claim set, replacing any previous one.
    ///
    /// Only the tokens [`Client::verify`] accepted for this session are assembled.
    pub async fn assemble_claims(&mut self, tokens: &TokenResponse) -> Result<ClaimSet, Error> {
        let config = self.config.as_ref().ok_or_else(not_configured)?;
        claims::require_token_fields(tokens)?;

        let accepted = self
            .session
            .token_response()
            .is_some_and(|accepted| accepted.id_token == tokens.id_token);
        if !accepted {
            warn!("Refused to assemble claims for unverified tokens");
            return Err(token_error(
                TokenErrorKind::Unverified,
                "Tokens have not been verified for this session",
            ));
        }

        let http = Self::http_for(&mut self.http, config)?;
        let metadata = self
            .discovery
            .load(&http, &config.provider_url, config.backchannel_timeout)
            .await?;
        let userinfo_endpoint = metadata.userinfo_endpoint.clone();

        let (userinfo, claims) = claims::assemble_claims(
            &http,
            &userinfo_endpoint,
            tokens,
            config.backchannel_timeout,
        )
        .await?;

        self.session.store_claims(userinfo, claims.clone());
        Ok(claims)
    }

    /// Verify `tokens` and assemble the user's claims.
    ///
    /// Claims are only fetched for a verified token; `None` means the token belongs to
    /// someone other than `expected_user_id`.
    pub async fn get_identity(
        &mut self,
        tokens: &TokenResponse,
        expected_user_id: Option<&str>,
    ) -> Result<Option<Identity>, Error> {
        let Some(verified) = self.verify_identity(tokens, expected_user_id).await? else {
            return Ok(None);
        };
        let claims = self.assemble_claims(tokens).await?;
        Ok(Some(Identity { verified, claims }))
    }

    pub fn is_authorized(&self) -> bool {
        self.session.is_authorized()
    }

    /// The `sub` claim of the assembled claims, or an empty string.
    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }

    /// The `email` claim of the assembled claims, or an empty string.
    pub fn email(&self) -> &str {
        self.session.email()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Forget the signed in user.
    ///
    /// With `including_auth` the flow and the configuration binding go too. Without it the
    /// configuration, state and nonce survive so the flow can resume.
    pub fn clear(&mut self, including_auth: bool) {
        self.session.clear();
        if including_auth {
            self.flow.reset();
            self.config = None;
            self.http = None;
            self.session.phase = Phase::Unstarted;
        } else {
            self.flow.clear_callback_url();
            self.session.phase = if self.flow.is_armed() {
                Phase::AuthorizationRequested
            } else {
                Phase::Unstarted
            };
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("discovery", &self.discovery)
            .field("flow", &self.flow)
            .field("session", &self.session)
            .finish()
    }
}
