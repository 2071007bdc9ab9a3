use std::fmt;
use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;

/// Classified failure of the authorization pipeline.
///
/// Every variant maps to a fixed HTTP status code, a stable machine-readable error code and a human-readable
/// description. None of them carries token material or text from the underlying JWT library.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header is expected.")]
    AuthorizationHeaderMissing,
    #[error("Authorization header must be bearer token.")]
    MalformedHeader,
    #[error("Unable to parse authentication token.")]
    MalformedToken,
    #[error("Unable to find the appropriate key.")]
    KeyNotFound,
    #[error("Token expired.")]
    TokenExpired,
    #[error("{0}")]
    InvalidClaims(ClaimsViolation),
    #[error("Permissions not included in JWT.")]
    PermissionsClaimMissing,
    #[error("Permission not found.")]
    PermissionNotFound,
}

/// Why a signed token's claims were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimsViolation {
    Audience,
    Issuer,
    /// The signature did not verify, or the token declared an algorithm other than the trusted one.
    Signature,
    /// The claim set could not be decoded into the expected shape.
    Malformed,
}

impl ClaimsViolation {
    fn description(self) -> &'static str {
        match self {
            ClaimsViolation::Audience | ClaimsViolation::Issuer => {
                "Incorrect claims. Please, check the audience and issuer."
            }
            ClaimsViolation::Signature => "Unable to verify token signature.",
            ClaimsViolation::Malformed => "Unable to parse token claims.",
        }
    }
}

impl fmt::Display for ClaimsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken | AuthError::PermissionsClaimMissing => StatusCode::BAD_REQUEST,
            AuthError::PermissionNotFound => StatusCode::FORBIDDEN,
            AuthError::AuthorizationHeaderMissing
            | AuthError::MalformedHeader
            | AuthError::KeyNotFound
            | AuthError::TokenExpired
            | AuthError::InvalidClaims(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::AuthorizationHeaderMissing => "authorization_header_missing",
            AuthError::MalformedHeader | AuthError::MalformedToken | AuthError::KeyNotFound => {
                "invalid_header"
            }
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidClaims(_) | AuthError::PermissionsClaimMissing => "invalid_claims",
            AuthError::PermissionNotFound => "unauthorized",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AuthError::AuthorizationHeaderMissing => "Authorization header is expected.",
            AuthError::MalformedHeader => "Authorization header must be bearer token.",
            AuthError::MalformedToken => "Unable to parse authentication token.",
            AuthError::KeyNotFound => "Unable to find the appropriate key.",
            AuthError::TokenExpired => "Token expired.",
            AuthError::InvalidClaims(violation) => violation.description(),
            AuthError::PermissionsClaimMissing => "Permissions not included in JWT.",
            AuthError::PermissionNotFound => "Permission not found.",
        }
    }
}

/// JSON body rendered for every [`AuthError`].
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: u16,
    pub message: &'static str,
}

impl From<&AuthError> for ErrorBody {
    fn from(error: &AuthError) -> Self {
        ErrorBody {
            success: false,
            error: error.status_code().as_u16(),
            message: error.description(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody::from(&self))).into_response()
    }
}

/// Failure to obtain a signing key set from its remote source.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum KeyFetchError {
    #[error("failed to fetch JWK set")]
    Request(#[from] reqwest::Error),
    #[error("received error response when fetching JWK set: {status_code}")]
    ErrorResponse { status_code: StatusCode },
    #[error("JWK set document is malformed")]
    Malformed(#[source] serde_json::Error),
    #[error("fetching JWK set timed out")]
    Timeout,
    #[error("JWK set requests are rate limited")]
    RateLimited,
    #[error("invalid JWK set url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// A failure of a fetch that several concurrent callers waited on.
    #[error(transparent)]
    Shared(Arc<KeyFetchError>),
}

impl KeyFetchError {
    /// Takes the error back out of the `Arc` when no other caller still holds it.
    pub(crate) fn from_shared(error: Arc<KeyFetchError>) -> Self {
        Arc::try_unwrap(error).unwrap_or_else(KeyFetchError::Shared)
    }

    /// The underlying failure, looking through [`KeyFetchError::Shared`].
    pub fn root(&self) -> &KeyFetchError {
        match self {
            KeyFetchError::Shared(error) => error.root(),
            error => error,
        }
    }
}
