use std::sync::Arc;

use http::HeaderMap;

use crate::{extract, permissions, AuthError, KeyFetchError, KeyProvider, ValidatedPayload, Verifier};

/// Extracts, verifies and permission-checks the bearer token of a request.
///
/// The gate holds no request state. Clones share the key provider and its cache.
#[derive(Clone)]
pub struct AuthorizationGate {
    keys: KeyProvider,
    verifier: Arc<Verifier>,
}

impl AuthorizationGate {
    pub fn new(keys: impl Into<KeyProvider>, verifier: Verifier) -> Self {
        Self {
            keys: keys.into(),
            verifier: Arc::new(verifier),
        }
    }

    pub fn key_provider(&self) -> &KeyProvider {
        &self.keys
    }

    /// Authorizes a request whose headers are `headers`, requiring `required_permission`.
    ///
    /// Returns the verified payload, or the first failure of the pipeline.
    pub async fn authorize(
        &self,
        required_permission: &str,
        headers: &HeaderMap,
    ) -> Result<ValidatedPayload, AuthError> {
        let result = self.run(required_permission, headers).await;
        if let Err(error) = &result {
            tracing::debug!(
                permission = required_permission,
                error_code = error.error_code(),
                status = error.status_code().as_u16(),
                "request not authorized"
            );
        }
        result
    }

    async fn run(&self, required_permission: &str, headers: &HeaderMap) -> Result<ValidatedPayload, AuthError> {
        let raw_token = extract::extract(headers)?;
        let payload = self.verify(raw_token).await?;
        permissions::require(&payload, required_permission)?;
        Ok(payload)
    }

    /// Verifies against the current key set. The token header is decoded first, so a malformed token is rejected
    /// without touching the key source. On `KeyNotFound` the key set is refreshed once and verification retried; a
    /// second miss is final.
    async fn verify(&self, raw_token: &str) -> Result<ValidatedPayload, AuthError> {
        let header = self.verifier.header(raw_token)?;
        if header.kid.is_none() {
            return Err(AuthError::KeyNotFound);
        }

        let key_set = self.keys.get_keys().await.map_err(key_set_unavailable)?;
        match self.verifier.verify_with_header(raw_token, &header, &key_set) {
            Err(AuthError::KeyNotFound) => {
                let Some(refreshed) = self.keys.refresh().await.map_err(key_set_unavailable)? else {
                    return Err(AuthError::KeyNotFound);
                };
                tracing::debug!("retrying verification with refreshed key set");
                self.verifier.verify_with_header(raw_token, &header, &refreshed)
            }
            result => result,
        }
    }
}

fn key_set_unavailable(error: KeyFetchError) -> AuthError {
    tracing::warn!(%error, "signing key set unavailable");
    AuthError::KeyNotFound
}
