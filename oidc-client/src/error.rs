//! Error types for the `oidc-client` crate.
//!
//! Follows the same pattern as the rest of the workspace: a root Error struct holding an
//! error kind and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for oidc-client crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in oidc-client.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Config(ConfigErrorKind),
    Discovery(DiscoveryErrorKind),
    Callback(CallbackErrorKind),
    Token(TokenErrorKind),
    IdToken(IdTokenErrorKind),
    Http(HttpErrorKind),
}

/// Errors caused by caller input or missing client setup.
#[derive(Debug, PartialEq)]
pub enum ConfigErrorKind {
    InvalidArgument,
    NotConfigured,
}

/// Errors from loading the provider's metadata document.
#[derive(Debug, PartialEq)]
pub enum DiscoveryErrorKind {
    Unreachable,
    InvalidDocument,
    MissingField,
}

/// Errors from validating the authorization callback.
#[derive(Debug, PartialEq)]
pub enum CallbackErrorKind {
    /// The provider returned an `error` parameter; its text is carried in `source`.
    ProviderError,
    MalformedCallback,
    CsrfMismatch,
    MissingRedirectUri,
}

/// Errors from the token and userinfo endpoints.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    TokenExchangeError,
    MissingTokenFields,
    UserInfoError,
    /// The tokens are not the ones this session accepted.
    Unverified,
}

/// Errors from ID token verification.
#[derive(Debug, PartialEq)]
pub enum IdTokenErrorKind {
    InvalidTokenData,
    InvalidTokenFormat,
    InvalidNonce,
    NoKeysFound,
    SignatureVerificationFailed,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    RequestFailed,
    Network,
}

impl Error {
    /// Returns true for failures a host should answer with an authentication-rejected
    /// response rather than a server error.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Callback(_)
                | ErrorKind::IdToken(_)
                | ErrorKind::Token(TokenErrorKind::MissingTokenFields)
                | ErrorKind::Token(TokenErrorKind::Unverified)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Config(kind) => write!(f, "Configuration error: {:?}", kind)?,
            ErrorKind::Discovery(kind) => write!(f, "Discovery error: {:?}", kind)?,
            ErrorKind::Callback(kind) => write!(f, "Callback error: {:?}", kind)?,
            ErrorKind::Token(kind) => write!(f, "Token error: {:?}", kind)?,
            ErrorKind::IdToken(kind) => write!(f, "ID token error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_request() {
            ErrorKind::Http(HttpErrorKind::RequestFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<reqwest_middleware::Error> for Error {
    fn from(err: reqwest_middleware::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Http(HttpErrorKind::Network),
        }
    }
}

/// Helper function to create configuration errors.
pub fn config_error(kind: ConfigErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Config(kind),
    }
}

/// Helper function to create discovery errors.
pub fn discovery_error(kind: DiscoveryErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Discovery(kind),
    }
}

/// Helper function to create callback errors.
pub fn callback_error(kind: CallbackErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Callback(kind),
    }
}

/// Helper function to create token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}

/// Helper function to create ID token errors.
pub fn id_token_error(kind: IdTokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::IdToken(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_message() {
        let err = callback_error(CallbackErrorKind::ProviderError, "access_denied");
        assert_eq!(err.to_string(), "Callback error: ProviderError (access_denied)");
    }

    #[test]
    fn test_rejections() {
        assert!(callback_error(CallbackErrorKind::CsrfMismatch, "state").is_rejection());
        assert!(id_token_error(IdTokenErrorKind::InvalidNonce, "nonce").is_rejection());
        assert!(
            id_token_error(IdTokenErrorKind::SignatureVerificationFailed, "sig").is_rejection()
        );
        assert!(token_error(TokenErrorKind::Unverified, "tokens").is_rejection());
        assert!(!discovery_error(DiscoveryErrorKind::Unreachable, "down").is_rejection());
        assert!(!token_error(TokenErrorKind::TokenExchangeError, "500").is_rejection());
        assert!(!config_error(ConfigErrorKind::NotConfigured, "none").is_rejection());
    }
}
