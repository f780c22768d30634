use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use log::LevelFilter;
use oidc_client::config::{DEFAULT_CALLBACK_PATH, DEFAULT_PROVIDER_URL};
use oidc_client::error::{config_error, ConfigErrorKind};
use oidc_client::http::BackchannelClientBuilder;
use oidc_client::{ClientAuthentication, ClientConfig, Error};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl fmt::Display for RustEnvParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected one of development, production, staging")
    }
}

impl std::error::Error for RustEnvParseError {}

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

fn parse_level_filter(level: &str) -> Result<LevelFilter, String> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| format!("unknown log level {}", level))
}

/// How the client authenticates at the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClientAuth {
    /// HTTP Basic authentication header
    Basic,
    /// Credentials in the form body
    Post,
}

impl From<ClientAuth> for ClientAuthentication {
    fn from(style: ClientAuth) -> Self {
        match style {
            ClientAuth::Basic => ClientAuthentication::BasicAuth,
            ClientAuth::Post => ClientAuthentication::RequestBody,
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Client identifier registered with the identity provider
    #[arg(long, env)]
    oidc_client_id: Option<String>,

    /// Client secret registered with the identity provider
    #[arg(long, env, hide_env_values = true)]
    oidc_client_secret: Option<String>,

    /// Scopes to request, comma separated
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "openid,profile,email"
    )]
    pub oidc_scopes: Vec<String>,

    /// Path on this relying party the provider redirects back to
    #[arg(long, env, default_value = DEFAULT_CALLBACK_PATH)]
    pub oidc_callback_path: String,

    /// Base address of the identity provider
    #[arg(long, env, default_value = DEFAULT_PROVIDER_URL)]
    pub oidc_provider_url: String,

    /// Timeout in seconds for discovery, token and userinfo requests
    #[arg(long, env, default_value_t = 60)]
    pub oidc_backchannel_timeout_secs: u64,

    /// How to present client credentials to the token endpoint
    #[arg(long, env, value_enum, default_value_t = ClientAuth::Basic)]
    pub oidc_client_auth: ClientAuth,

    /// Optional `access_type` authorization parameter, e.g. `offline`
    #[arg(long, env)]
    pub oidc_access_type: Option<String>,

    /// Base URI of this relying party; the callback path is appended to it
    #[arg(long, env, default_value = "http://localhost:4000")]
    pub oidc_base_uri: String,

    /// Retries for transient back-channel failures. Zero disables retrying.
    #[arg(long, env, default_value_t = 0)]
    pub oidc_max_retries: u32,

    /// Accept expired ID tokens. Refused when running in production.
    #[arg(long, env, default_value_t = false)]
    pub oidc_skip_lifetime_validation: bool,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(long, env, default_value_t = LevelFilter::Info, value_parser = parse_level_filter)]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(long, env, default_value_t = RustEnv::Development)]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn oidc_client_id(&self) -> Option<&str> {
        self.oidc_client_id.as_deref()
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }

    pub fn backchannel_timeout(&self) -> Duration {
        Duration::from_secs(self.oidc_backchannel_timeout_secs)
    }

    /// Build the relying party configuration from these settings.
    pub fn client_config(&self) -> Result<ClientConfig, Error> {
        let client_id = Self::required(&self.oidc_client_id, "OIDC_CLIENT_ID")?;
        let client_secret = Self::required(&self.oidc_client_secret, "OIDC_CLIENT_SECRET")?;
        if self.oidc_skip_lifetime_validation && self.is_production() {
            return Err(config_error(
                ConfigErrorKind::InvalidArgument,
                "ID token lifetime validation cannot be skipped in production",
            ));
        }

        let http = BackchannelClientBuilder::new()
            .with_timeout(self.backchannel_timeout())
            .with_max_retries(self.oidc_max_retries)
            .build()?;

        let mut config = ClientConfig::new(client_id, client_secret)
            .with_scopes(self.oidc_scopes.iter().cloned())
            .with_callback_path(self.oidc_callback_path.clone())
            .with_provider_url(self.oidc_provider_url.clone())
            .with_backchannel_timeout(self.backchannel_timeout())
            .with_client_authentication(self.oidc_client_auth.into())
            .with_http_client(http);
        if let Some(access_type) = self.oidc_access_type.as_deref().filter(|a| !a.is_empty()) {
            config = config.with_access_type(access_type);
        }
        if self.oidc_skip_lifetime_validation {
            config = config.without_lifetime_validation();
        }

        Ok(config)
    }

    fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Error> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                config_error(
                    ConfigErrorKind::NotConfigured,
                    &format!("{} is not set", name),
                )
            })
    }
}
