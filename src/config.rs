//! Process-wide authorization settings.
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! issuer = "https://dev-abc.us.auth0.com/"
//! audience = "drinks"
//! algorithm = "RS256"
//! cache_ttl_secs = 600
//!
//! [rate_limit]
//! num = 10
//! per_secs = 60
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::oidc::{well_known_url, OidcProvider, JWKS_ENDPOINT};
use crate::remote_key_set::{DEFAULT_FETCH_TIMEOUT, DEFAULT_MIN_REFRESH_INTERVAL};
use crate::{AuthorizationGate, KeyFetchError, RemoteKeySet, Verifier};

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    Read(#[from] io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to discover JWK set url")]
    Discovery(#[source] KeyFetchError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    pub num: u64,
    pub per_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Expected `iss` claim, also the base URL for well-known documents.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    /// Explicit JWKS location. Defaults to `<issuer>/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_url: Option<Url>,
    /// Look the JWKS location up in the issuer's OpenID configuration instead.
    #[serde(default)]
    pub discover: bool,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Zero disables caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Minimum time between two forced refreshes triggered by unknown key IDs.
    #[serde(default = "default_min_refresh_interval_secs")]
    pub min_refresh_interval_secs: u64,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    #[serde(default)]
    pub leeway_secs: u64,
}

fn default_algorithm() -> Algorithm {
    Algorithm::RS256
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_min_refresh_interval_secs() -> u64 {
    DEFAULT_MIN_REFRESH_INTERVAL.as_secs()
}

impl AuthConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            algorithm: default_algorithm(),
            jwks_url: None,
            discover: false,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            min_refresh_interval_secs: default_min_refresh_interval_secs(),
            rate_limit: None,
            leeway_secs: 0,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AuthConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Read(error),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Invalid("issuer must not be empty".into()));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::Invalid("audience must not be empty".into()));
        }
        if matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(ConfigError::Invalid(format!(
                "algorithm {:?} is symmetric, an asymmetric algorithm is required",
                self.algorithm
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_secs must be positive".into()));
        }
        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.num == 0 || rate_limit.per_secs == 0 {
                return Err(ConfigError::Invalid(
                    "rate_limit.num and rate_limit.per_secs must be positive".into(),
                ));
            }
        }
        if self.jwks_url.is_none() {
            self.issuer_url()?;
        }
        Ok(())
    }

    fn issuer_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.issuer)
            .map_err(|error| ConfigError::Invalid(format!("issuer is not a valid url: {error}")))
    }

    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.algorithm, self.audience.clone(), self.issuer.clone()).with_leeway(self.leeway_secs)
    }

    /// Where the signing keys live: the explicit `jwks_url`, the discovered one, or the conventional location.
    pub async fn resolve_jwks_url(&self) -> Result<Url, ConfigError> {
        if let Some(jwks_url) = &self.jwks_url {
            return Ok(jwks_url.clone());
        }

        let issuer_url = self.issuer_url()?;
        if self.discover {
            let provider = OidcProvider::new(issuer_url);
            let discovery = tokio::time::timeout(self.fetch_timeout(), provider.jwks_url());
            return match discovery.await {
                Ok(result) => result.map_err(ConfigError::Discovery),
                Err(_) => Err(ConfigError::Discovery(KeyFetchError::Timeout)),
            };
        }

        well_known_url(&issuer_url, JWKS_ENDPOINT)
            .map_err(|error| ConfigError::Invalid(format!("cannot derive JWK set url: {error}")))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl AuthorizationGate {
    /// Builds a gate backed by the issuer's remote key set.
    ///
    /// Must run inside a tokio runtime when `rate_limit` is set.
    pub async fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let jwks_url = config.resolve_jwks_url().await?;
        tracing::info!(%jwks_url, issuer = %config.issuer, audience = %config.audience, "configuring authorization gate");

        let mut builder = RemoteKeySet::builder(jwks_url).with_timeout(config.fetch_timeout());
        if config.cache_ttl_secs > 0 {
            builder = builder
                .with_cache(Duration::from_secs(config.cache_ttl_secs))
                .with_min_refresh_interval(Duration::from_secs(config.min_refresh_interval_secs));
        }
        if let Some(rate_limit) = &config.rate_limit {
            builder = builder.with_rate_limit(rate_limit.num, Duration::from_secs(rate_limit.per_secs));
        }

        Ok(AuthorizationGate::new(builder.build(), config.verifier()))
    }
}
