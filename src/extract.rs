use http::{header::AUTHORIZATION, HeaderMap};

use crate::AuthError;

const BEARER_SCHEME: &str = "Bearer";

/// Pulls the raw bearer token out of the `Authorization` header.
///
/// The header must consist of exactly two space-separated parts, the first being the case-sensitive scheme `Bearer`.
/// The token itself is returned verbatim.
pub fn extract(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::AuthorizationHeaderMissing)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
