//! Hooks for embedding the client in a web host.
//!
//! A host calls [`Handler::challenge`] when a request needs authentication,
//! [`Handler::handle_request`] for every incoming request so the callback path is picked up,
//! and [`Handler::sign_out`] on logout. Establishing the host's own session is left to its
//! [`SignIn`] implementation.

use async_trait::async_trait;
use log::*;

use crate::client::Client;
use crate::error::{id_token_error, CallbackErrorKind, Error, ErrorKind, IdTokenErrorKind};
use crate::flow::{callback_url, Callback};
use crate::session::Identity;

/// The host side of a sign in.
#[async_trait]
pub trait SignIn: Send + Sync {
    /// Establish the host session for a verified identity.
    async fn sign_in(&self, identity: &Identity);

    /// Tear down the host session.
    async fn sign_out(&self) {}
}

/// Why a callback was refused. Details stay in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The provider denied the request.
    ProviderDenied,
    /// The callback was forged, replayed or incomplete.
    InvalidCallback,
    /// The tokens did not verify.
    InvalidToken,
}

impl Rejection {
    fn from_error(err: &Error) -> Option<Self> {
        if !err.is_rejection() {
            return None;
        }
        Some(match &err.error_kind {
            ErrorKind::Callback(CallbackErrorKind::ProviderError) => Rejection::ProviderDenied,
            ErrorKind::Callback(_) => Rejection::InvalidCallback,
            _ => Rejection::InvalidToken,
        })
    }
}

/// Result of offering a request to the handler.
#[derive(Debug)]
pub enum Outcome {
    /// Not the callback path; the host handles the request itself.
    NotHandled,
    SignedIn(Identity),
    Rejected(Rejection),
}

/// Drives a [`Client`] from the host's request pipeline.
pub struct Handler<S: SignIn> {
    client: Client,
    host: S,
}

impl<S: SignIn> Handler<S> {
    pub fn new(client: Client, host: S) -> Self {
        Self { client, host }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// The location to redirect an unauthenticated user to.
    pub async fn challenge(&mut self, base_uri: &str, state: Option<&str>) -> Result<String, Error> {
        self.client.build_authorization_url(base_uri, state).await
    }

    /// Complete the sign in when `path` is the configured callback path.
    ///
    /// Rejected callbacks come back as [`Outcome::Rejected`]; only infrastructure failures such
    /// as an unreachable provider are errors.
    pub async fn handle_request(
        &mut self,
        base_uri: &str,
        path: &str,
        query: &str,
    ) -> Result<Outcome, Error> {
        let redirect_uri = match self.client.config() {
            Some(config) if config.callback_path == path => {
                callback_url(base_uri, &config.callback_path)
            }
            _ => return Ok(Outcome::NotHandled),
        };

        let callback = Callback::from_query(query);
        match self.authenticate(&callback, &redirect_uri).await {
            Ok(identity) => {
                self.host.sign_in(&identity).await;
                info!("Signed in user {}", identity.user_id());
                Ok(Outcome::SignedIn(identity))
            }
            Err(e) => match Rejection::from_error(&e) {
                Some(rejection) => {
                    warn!("Rejected authentication response: {}", e);
                    Ok(Outcome::Rejected(rejection))
                }
                None => {
                    error!("Authentication failed: {}", e);
                    Err(e)
                }
            },
        }
    }

    async fn authenticate(
        &mut self,
        callback: &Callback,
        redirect_uri: &str,
    ) -> Result<Identity, Error> {
        let tokens = self.client.exchange(callback, Some(redirect_uri)).await?;
        // without an expected user the token can only be rejected, never mismatched
        match self.client.get_identity(&tokens, None).await? {
            Some(identity) => Ok(identity),
            None => Err(id_token_error(
                IdTokenErrorKind::InvalidTokenData,
                "ID token did not identify a user",
            )),
        }
    }

    /// Forget the user in both the client and the host.
    pub async fn sign_out(&mut self) {
        self.client.clear(true);
        self.host.sign_out().await;
        debug!("Signed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::test_support::*;
    use mockito::{Mock, Server, ServerGuard};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingHost {
        signed_in: Arc<Mutex<Vec<String>>>,
        signed_out: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl SignIn for RecordingHost {
        async fn sign_in(&self, identity: &Identity) {
            self.signed_in.lock().await.push(identity.user_id().to_string());
        }

        async fn sign_out(&self) {
            *self.signed_out.lock().await = true;
        }
    }

    fn handler(server: &ServerGuard, host: RecordingHost) -> Handler<RecordingHost> {
        let client = Client::new(ClientConfig::new(CLIENT_ID, "MockSecret"))
            .with_metadata(metadata(&server.url()));
        Handler::new(client, host)
    }

    async fn provider(server: &mut ServerGuard, nonce: &str) -> (Mock, Mock) {
        let token = server
            .mock("POST", "/token")
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"access_token":"MockToken","expires_in":600,"id_token":"{}","token_type":"Bearer"}}"#,
                id_token("S", nonce)
            ))
            .create_async()
            .await;
        let user = server
            .mock("GET", "/user")
            .with_header("content-type", "application/json")
            .with_body(r#"{"sub":"S","email":"noone@example.com"}"#)
            .create_async()
            .await;
        (token, user)
    }

    #[tokio::test]
    async fn test_callback_signs_in() {
        let mut server = Server::new_async().await;
        let host = RecordingHost::default();
        let mut handler = handler(&server, host.clone());

        let location = handler.challenge("https://rp.example", None).await.unwrap();
        let params = query_of(&location);
        let _provider = provider(&mut server, &params["nonce"]).await;

        let query = format!("code=MockCode&state={}", params["state"]);
        let outcome = handler
            .handle_request("https://rp.example", "/SigninMiracl", &query)
            .await
            .unwrap();

        match outcome {
            Outcome::SignedIn(identity) => assert_eq!(identity.email(), "noone@example.com"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(*host.signed_in.lock().await, vec!["S".to_string()]);
        assert!(handler.client().is_authorized());
    }

    #[tokio::test]
    async fn test_other_paths_are_not_handled() {
        let server = Server::new_async().await;
        let mut handler = handler(&server, RecordingHost::default());

        let outcome = handler
            .handle_request("https://rp.example", "/home", "code=c&state=s")
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::NotHandled));
    }

    #[tokio::test]
    async fn test_forged_state_is_rejected() {
        let server = Server::new_async().await;
        let host = RecordingHost::default();
        let mut handler = handler(&server, host.clone());
        handler.challenge("https://rp.example", Some("expected")).await.unwrap();

        let outcome = handler
            .handle_request("https://rp.example", "/SigninMiracl", "code=c&state=forged")
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            Outcome::Rejected(Rejection::InvalidCallback)
        ));
        assert!(host.signed_in.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_provider_denial_is_rejected() {
        let server = Server::new_async().await;
        let mut handler = handler(&server, RecordingHost::default());
        handler.challenge("https://rp.example", None).await.unwrap();

        let outcome = handler
            .handle_request(
                "https://rp.example",
                "/SigninMiracl",
                "error=access_denied&error_description=User%20cancelled",
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            Outcome::Rejected(Rejection::ProviderDenied)
        ));
    }

    #[tokio::test]
    async fn test_sign_out_clears_everything() {
        let server = Server::new_async().await;
        let host = RecordingHost::default();
        let mut handler = handler(&server, host.clone());
        handler.challenge("https://rp.example", None).await.unwrap();

        handler.sign_out().await;

        assert!(*host.signed_out.lock().await);
        assert!(handler.client().config().is_none());
        assert!(!handler.client().is_authorized());
    }
}
