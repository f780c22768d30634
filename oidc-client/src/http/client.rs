//! The HTTP transport for discovery, token and userinfo requests.

use std::time::Duration;

use reqwest_middleware::ClientBuilder;
use reqwest_retry::RetryTransientMiddleware;

use super::BackoffPolicy;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per request timeout; also bounds the time spent retrying.
    pub timeout: Duration,
    /// Retries for transient failures. Off unless asked for.
    pub max_retries: u32,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 0,
            user_agent: format!("oidc-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client used for all backchannel requests.
pub type BackchannelClient = reqwest_middleware::ClientWithMiddleware;

/// Builds the default backchannel transport.
///
/// Hosts that need their own transport (proxies, custom TLS roots) build a `reqwest::Client`
/// and hand it to [`BackchannelClientBuilder::wrap`] instead.
#[derive(Debug, Default)]
pub struct BackchannelClientBuilder {
    config: HttpClientConfig,
}

impl BackchannelClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn build(self) -> Result<BackchannelClient, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent.as_str())
            .build()?;

        let mut builder = ClientBuilder::new(client);
        if self.config.max_retries > 0 {
            let policy = BackoffPolicy::new(self.config.max_retries).with_budget(self.config.timeout);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(policy));
        }
        Ok(builder.build())
    }

    /// Use a caller supplied `reqwest::Client` as is, without retries.
    pub fn wrap(client: reqwest::Client) -> BackchannelClient {
        ClientBuilder::new(client).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_defaults_do_not_retry() {
        let builder = BackchannelClientBuilder::new();
        assert_eq!(builder.config().timeout, Duration::from_secs(60));
        assert_eq!(builder.config().max_retries, 0);
        assert!(builder.config().user_agent.starts_with("oidc-client/"));
    }

    #[tokio::test]
    async fn test_user_agent_is_sent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_header("user-agent", "relying-party/1.0")
            .create_async()
            .await;

        let http = BackchannelClientBuilder::new()
            .with_user_agent("relying-party/1.0")
            .build()
            .unwrap();
        http.get(server.url()).send().await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_when_enabled() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let http = BackchannelClientBuilder::new()
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1)
            .build()
            .unwrap();
        let response = http.get(server.url()).send().await.unwrap();

        assert_eq!(response.status(), 503);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_wrapped_client_sends_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let http = BackchannelClientBuilder::wrap(reqwest::Client::new());
        http.get(server.url()).send().await.unwrap();

        mock.assert_async().await;
    }
}
