use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::KeyFetchError;

/// Conventional location of an issuer's JWK set. Most providers publish it here, so discovery is optional.
pub const JWKS_ENDPOINT: &str = ".well-known/jwks.json";

pub const OIDC_CONFIGURATION_ENDPOINT: &str = ".well-known/openid-configuration";

/// Resolves `document` relative to the issuer, keeping any path the issuer URL has.
pub fn well_known_url(issuer_url: &Url, document: &str) -> Result<Url, url::ParseError> {
    let mut base = issuer_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(document)
}

/// OpenID Connect provider whose metadata names the JWKS URI.
pub struct OidcProvider {
    issuer_url: Url,
    http_client: Client,
}

impl OidcProvider {
    pub fn new(issuer_url: Url) -> Self {
        Self::with_http_client(issuer_url, Client::new())
    }

    pub fn with_http_client(issuer_url: Url, http_client: Client) -> Self {
        Self {
            issuer_url,
            http_client,
        }
    }

    pub fn issuer(&self) -> &Url {
        &self.issuer_url
    }

    pub async fn configuration(&self) -> Result<OpenIdConfiguration, KeyFetchError> {
        let openid_configuration_url = well_known_url(&self.issuer_url, OIDC_CONFIGURATION_ENDPOINT)?;
        tracing::debug!(url = %openid_configuration_url, "fetching OpenID configuration");

        let response = self.http_client.get(openid_configuration_url).send().await?;
        if !response.status().is_success() {
            return Err(KeyFetchError::ErrorResponse {
                status_code: response.status(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(KeyFetchError::Malformed)
    }

    pub async fn jwks_url(&self) -> Result<Url, KeyFetchError> {
        Ok(self.configuration().await?.jwks_uri)
    }
}

/// Response payload of the OpenID provider's `.well-known/openid-configuration` endpoint.
///
/// Only covers those fields that are relevant in our context.
#[derive(Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: Option<String>,
    /// The URI where to retrieve the OIDC provider's signing keys.
    pub jwks_uri: Url,
}
