//! Provider metadata discovery and JWKS loading.
//!
//! The metadata document is fetched once per client and cached for the client's lifetime.
//! Key rotation is handled by creating a new client, never by refetching here.

use std::time::Duration;

use log::*;
use serde::Deserialize;

use crate::error::{discovery_error, DiscoveryErrorKind, Error, ErrorKind};
use crate::http::BackchannelClient;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// A single signing key from the provider's JWKS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(rename = "use", default)]
    pub use_: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    /// RSA modulus, base64url encoded big-endian.
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent, base64url encoded big-endian.
    #[serde(default)]
    pub e: Option<String>,
}

/// The provider's JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find a key by its key id.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Endpoints and keys published by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks: Option<JwkSet>,
}

/// Raw discovery document; required fields are checked after parsing so a missing one
/// is reported by name.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    jwks_uri: Option<String>,
    jwks: Option<JwkSet>,
}

fn required(value: Option<String>, field: &str) -> Result<String, Error> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => {
            warn!("Discovery document is missing {}", field);
            Err(discovery_error(
                DiscoveryErrorKind::MissingField,
                &format!("Discovery document is missing {}", field),
            ))
        }
    }
}

/// Memoizes the provider metadata for one client instance.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    metadata: Option<ProviderMetadata>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self { metadata: None }
    }

    /// A cache that starts out loaded, for providers configured statically.
    pub fn preloaded(metadata: ProviderMetadata) -> Self {
        Self {
            metadata: Some(metadata),
        }
    }

    pub fn get(&self) -> Option<&ProviderMetadata> {
        self.metadata.as_ref()
    }

    /// Load the metadata for `provider_url`, or return the cached copy without a network call.
    pub async fn load(
        &mut self,
        http: &BackchannelClient,
        provider_url: &str,
        timeout: Duration,
    ) -> Result<&ProviderMetadata, Error> {
        if self.metadata.is_none() {
            let metadata = fetch_metadata(http, provider_url, timeout).await?;
            self.metadata = Some(metadata);
        }

        self.metadata.as_ref().ok_or_else(|| {
            discovery_error(DiscoveryErrorKind::InvalidDocument, "Metadata was not cached")
        })
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &BackchannelClient,
    url: &str,
    timeout: Duration,
) -> Result<T, Error> {
    let response = http.get(url).timeout(timeout).send().await.map_err(|e| {
        warn!("Failed to reach {}: {:?}", url, e);
        Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Discovery(DiscoveryErrorKind::Unreachable),
        }
    })?;

    if !response.status().is_success() {
        let status = response.status();
        warn!("Discovery request to {} returned {}", url, status);
        return Err(discovery_error(
            DiscoveryErrorKind::Unreachable,
            &format!("{} returned {}", url, status),
        ));
    }

    response.json::<T>().await.map_err(|e| {
        warn!("Failed to parse response from {}: {:?}", url, e);
        Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Discovery(DiscoveryErrorKind::InvalidDocument),
        }
    })
}

/// Fetch and validate the discovery document, resolving a linked JWKS.
pub async fn fetch_metadata(
    http: &BackchannelClient,
    provider_url: &str,
    timeout: Duration,
) -> Result<ProviderMetadata, Error> {
    let address = format!("{}{}", provider_url.trim_end_matches('/'), WELL_KNOWN_PATH);
    debug!("Loading provider metadata from {}", address);

    let document: DiscoveryDocument = get_json(http, &address, timeout).await?;

    let issuer = required(document.issuer, "issuer")?;
    let authorization_endpoint =
        required(document.authorization_endpoint, "authorization_endpoint")?;
    let token_endpoint = required(document.token_endpoint, "token_endpoint")?;
    let userinfo_endpoint = required(document.userinfo_endpoint, "userinfo_endpoint")?;

    let jwks = match (document.jwks, document.jwks_uri) {
        (Some(embedded), _) => Some(embedded),
        (None, Some(uri)) if !uri.trim().is_empty() => {
            debug!("Loading JWKS from {}", uri);
            Some(get_json::<JwkSet>(http, &uri, timeout).await?)
        }
        _ => {
            warn!("Provider at {} publishes no signing keys", provider_url);
            None
        }
    };

    info!("Loaded provider metadata for issuer {}", issuer);

    Ok(ProviderMetadata {
        issuer,
        authorization_endpoint,
        token_endpoint,
        userinfo_endpoint,
        jwks,
    })
}
