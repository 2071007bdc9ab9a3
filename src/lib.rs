//! Permission-based bearer token authorization [middleware for `axum`](https://docs.rs/axum/latest/axum/middleware/index.html).
//!
//! ## Overview
//!
//! Protected routes expect an `Authorization: Bearer <token>` header carrying a JSON Web Token signed by a trusted
//! issuer. For every request the [`AuthorizationGate`]
//!
//! 1. extracts the raw token from the header ([`extract`]),
//! 2. picks the issuer's public key by the token's key ID and verifies signature, expiry, audience and issuer
//!    ([`Verifier`]),
//! 3. checks that the token's `permissions` claim grants the permission the route requires ([`require`]).
//!
//! On success the [`ValidatedPayload`] is handed to the handler. Any failure short-circuits with an [`AuthError`]
//! whose status code and message are stable, rendered as
//! `{"success": false, "error": <status>, "message": <description>}`.
//!
//! ## Signing keys
//!
//! Keys come from a [`KeyProvider`]: either a local [`SigningKeySet`] or a [`RemoteKeySet`] fetched from the
//! issuer's JWKS endpoint, optionally cached and rate limited. When a token names a key ID missing from the current
//! set, the gate refreshes the set once and retries, which picks up key rotations without ever falling back to an
//! unverified key. Forced refreshes are spaced by a minimum interval, so a stream of tokens with made-up key IDs cannot
//! turn into a stream of JWKS requests.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{extract::Path, routing::delete, Router};
//! use axum_jwks_guard::{AuthConfig, AuthorizationGate, AuthorizationLayer, ValidatedPayload};
//!
//! async fn delete_drink(payload: ValidatedPayload, Path(id): Path<u64>) -> String {
//!     format!("{:?} deleted drink {id}", payload.subject)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::load("auth.toml").await?;
//!     let gate = AuthorizationGate::from_config(&config).await?;
//!
//!     let router = Router::new().route(
//!         "/drinks/{id}",
//!         delete(delete_drink).route_layer(AuthorizationLayer::new(gate, "delete:drinks")),
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod authorization;
pub mod config;
pub mod oidc;

pub use authorization::{AuthorizationLayer, MissingPayload};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ClaimsViolation, ErrorBody, KeyFetchError};
pub use extract::extract;
pub use gate::AuthorizationGate;
pub use key_provider::KeyProvider;
pub use key_set::SigningKeySet;
pub use permissions::require;
pub use remote_key_set::{RemoteKeySet, RemoteKeySetBuilder};
pub use verify::{Audience, ValidatedPayload, Verifier};

mod error;
mod extract;
mod gate;
mod jwks_cache;
mod key_provider;
mod key_set;
mod permissions;
mod remote_key_set;
mod verify;

#[cfg(test)]
mod test_support;
