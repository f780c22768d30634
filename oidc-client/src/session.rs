//! Per-flow session state and the identity handed to the host.

use serde_json::{Map, Value};

use crate::claims::ClaimSet;
use crate::flow::TokenResponse;
use crate::id_token::VerifiedIdentity;

/// Where a single authentication attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Unstarted,
    AuthorizationRequested,
    CallbackReceived,
    CsrfRejected,
    TokensExchanged,
    IdTokenRejected,
    Verified,
    Authorized,
}

impl Phase {
    /// Terminal failures; the caller has to build a new authorization URL.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Phase::CsrfRejected | Phase::IdTokenRejected)
    }
}

/// A verified ID token together with the claims assembled for it.
#[derive(Debug, Clone)]
pub struct Identity {
    pub verified: VerifiedIdentity,
    pub claims: ClaimSet,
}

impl Identity {
    /// The `sub` claim, or an empty string.
    pub fn user_id(&self) -> &str {
        self.claims.get("sub").unwrap_or_default()
    }

    /// The `email` claim, or an empty string.
    pub fn email(&self) -> &str {
        self.claims.get("email").unwrap_or_default()
    }
}

/// Results accumulated by the current flow.
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) phase: Phase,
    /// Only set once the ID token of this response verified.
    tokens: Option<TokenResponse>,
    identity: Option<VerifiedIdentity>,
    userinfo: Option<Map<String, Value>>,
    claims: Option<ClaimSet>,
}

impl Session {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_authorized(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn token_response(&self) -> Option<&TokenResponse> {
        self.tokens.as_ref()
    }

    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        self.identity.as_ref()
    }

    pub fn userinfo(&self) -> Option<&Map<String, Value>> {
        self.userinfo.as_ref()
    }

    pub fn claims(&self) -> Option<&ClaimSet> {
        self.claims.as_ref()
    }

    fn claim(&self, name: &str) -> &str {
        self.claims
            .as_ref()
            .and_then(|claims| claims.get(name))
            .unwrap_or_default()
    }

    pub fn user_id(&self) -> &str {
        self.claim("sub")
    }

    pub fn email(&self) -> &str {
        self.claim("email")
    }

    pub(crate) fn accept(&mut self, tokens: TokenResponse, identity: VerifiedIdentity) {
        self.tokens = Some(tokens);
        self.identity = Some(identity);
        self.phase = Phase::Verified;
    }

    pub(crate) fn store_claims(&mut self, userinfo: Map<String, Value>, claims: ClaimSet) {
        self.userinfo = Some(userinfo);
        self.claims = Some(claims);
        if self.is_authorized() {
            self.phase = Phase::Authorized;
        }
    }

    /// Drop everything the flow produced. The phase is left to the caller.
    pub(crate) fn clear(&mut self) {
        self.tokens = None;
        self.identity = None;
        self.userinfo = None;
        self.claims = None;
    }
}
