//! # oidc-client
//!
//! OpenID Connect relying party for the authorization code flow:
//! - Provider discovery and JWKS loading, cached per client
//! - Authorization URL construction with anti-forgery state and replay nonce
//! - Callback validation and the back-channel code exchange
//! - ID token verification (RS256 signature, issuer, audience, nonce, expiry)
//! - Claim assembly from the userinfo endpoint
//! - Host hooks for challenge, callback handling and sign-out
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_client::{Callback, Client, ClientConfig};
//!
//! let mut client = Client::new(ClientConfig::new("client-id", "client-secret"));
//! let url = client.build_authorization_url("https://rp.example", None).await?;
//! // redirect the user to `url`, then on the callback:
//! let tokens = client.exchange(&Callback::from_query(query), None).await?;
//! let identity = client.get_identity(&tokens, None).await?;
//! ```

pub mod claims;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod host;
pub mod http;
pub mod id_token;
pub mod session;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use claims::{Claim, ClaimSet};
pub use client::Client;
pub use config::{ClientAuthentication, ClientConfig};
pub use discovery::{JwkSet, ProviderMetadata};
pub use error::{Error, ErrorKind};
pub use flow::{Callback, TokenResponse};
pub use host::{Handler, Outcome, Rejection, SignIn};
pub use id_token::VerifiedIdentity;
pub use session::{Identity, Phase};
