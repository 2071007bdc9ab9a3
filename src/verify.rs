use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ClaimsViolation;
use crate::{AuthError, SigningKeySet};

/// Verified claim set of a bearer token.
///
/// Only ever produced by [`Verifier::verify`]. Claims that are not modelled explicitly are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedPayload {
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "aud")]
    pub audience: Audience,
    /// Expiry as seconds since the Unix epoch.
    #[serde(rename = "exp")]
    pub expires_at: u64,
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Granted permissions in token order. `None` when the token carries no `permissions` claim at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `aud` claim, which may hold a single audience or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(single) => single == audience,
            Audience::Multiple(multiple) => multiple.iter().any(|candidate| candidate == audience),
        }
    }
}

/// Verifies token signatures against a [`SigningKeySet`] and validates the standard claims.
///
/// The signing algorithm is fixed at construction. A token declaring any other algorithm is rejected before a key is
/// even touched.
#[derive(Debug, Clone)]
pub struct Verifier {
    algorithm: Algorithm,
    validation: Validation,
}

impl Verifier {
    pub fn new(algorithm: Algorithm, audience: impl Into<String>, issuer: impl Into<String>) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[audience.into()]);
        validation.set_issuer(&[issuer.into()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.leeway = 0;
        // `exp` equal to the current second already counts as expired.
        validation.reject_tokens_expiring_in_less_than = 1;
        Self {
            algorithm,
            validation,
        }
    }

    /// Tolerated clock skew, in seconds, when checking `exp`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.validation.leeway = leeway_secs;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Decodes the unverified header, used only to pick the key. Nothing in it is trusted beyond that.
    pub fn header(&self, raw_token: &str) -> Result<Header, AuthError> {
        if raw_token.split('.').count() != 3 {
            return Err(AuthError::MalformedToken);
        }
        decode_header(raw_token).map_err(|_| AuthError::MalformedToken)
    }

    pub fn verify(&self, raw_token: &str, key_set: &SigningKeySet) -> Result<ValidatedPayload, AuthError> {
        let header = self.header(raw_token)?;
        self.verify_with_header(raw_token, &header, key_set)
    }

    /// Verifies `raw_token` whose header was already decoded by [`Verifier::header`].
    pub fn verify_with_header(
        &self,
        raw_token: &str,
        header: &Header,
        key_set: &SigningKeySet,
    ) -> Result<ValidatedPayload, AuthError> {
        let jwk = header
            .kid
            .as_deref()
            .and_then(|kid| key_set.find(kid))
            .ok_or(AuthError::KeyNotFound)?;

        if header.alg != self.algorithm {
            return Err(AuthError::InvalidClaims(ClaimsViolation::Signature));
        }

        let decoding_key =
            DecodingKey::from_jwk(jwk).map_err(|_| AuthError::InvalidClaims(ClaimsViolation::Signature))?;

        // Decoding into a `Value` first lets signature and standard claims be judged before the payload shape.
        let claims = decode::<serde_json::Value>(raw_token, &decoding_key, &self.validation)
            .map_err(|error| classify(error.kind()))?
            .claims;

        serde_json::from_value(claims).map_err(|_| AuthError::InvalidClaims(ClaimsViolation::Malformed))
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidAudience => AuthError::InvalidClaims(ClaimsViolation::Audience),
        ErrorKind::InvalidIssuer => AuthError::InvalidClaims(ClaimsViolation::Issuer),
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "aud" => AuthError::InvalidClaims(ClaimsViolation::Audience),
            "iss" => AuthError::InvalidClaims(ClaimsViolation::Issuer),
            _ => AuthError::InvalidClaims(ClaimsViolation::Malformed),
        },
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => AuthError::MalformedToken,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey => AuthError::InvalidClaims(ClaimsViolation::Signature),
        _ => AuthError::InvalidClaims(ClaimsViolation::Malformed),
    }
}
