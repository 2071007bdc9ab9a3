use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::StatusCode;
use tower::Layer;
use tower_service::Service;

use crate::{AuthorizationGate, ValidatedPayload};

/// Protects the wrapped routes with an [`AuthorizationGate`], requiring one permission.
///
/// Meant for [`axum::Router::route_layer`], so that unmatched routes still answer with 404 rather than 401.
#[derive(Clone)]
pub struct AuthorizationLayer {
    gate: AuthorizationGate,
    permission: Arc<str>,
}

impl AuthorizationLayer {
    pub fn new(gate: AuthorizationGate, permission: impl Into<Arc<str>>) -> Self {
        Self {
            gate,
            permission: permission.into(),
        }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            gate: self.gate.clone(),
            permission: self.permission.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    gate: AuthorizationGate,
    permission: Arc<str>,
}

impl<S> Service<Request> for AuthorizationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // Move the original service into the closure instead of its clone. This makes sure that the original service is
        // `call`ed instead of the cloned one, which might not be ready yet (`poll_ready` hasn't been called on the
        // clone yet).
        // See [docs](https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services).
        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);

        let gate = self.gate.clone();
        let permission = self.permission.clone();
        Box::pin(async move {
            let authorize_result = gate.authorize(&permission, req.headers()).await;
            match authorize_result {
                Ok(payload) => {
                    req.extensions_mut().insert(payload);
                    inner.call(req).await
                }
                Err(auth_error) => Ok(auth_error.into_response()),
            }
        })
    }
}

/// Rejection for handlers that ask for a [`ValidatedPayload`] on a route without an [`AuthorizationLayer`].
#[derive(Debug, thiserror::Error)]
#[error("route is not protected by an authorization layer")]
pub struct MissingPayload;

impl IntoResponse for MissingPayload {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "payload requested outside an authorization layer");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Hands the payload verified by the [`AuthorizationLayer`] to the handler, by value.
impl<S> FromRequestParts<S> for ValidatedPayload
where
    S: Send + Sync,
{
    type Rejection = MissingPayload;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.remove::<ValidatedPayload>().ok_or(MissingPayload)
    }
}
