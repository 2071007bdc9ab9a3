use std::{
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use futures::future::BoxFuture;
use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;
use tower::{
    buffer::BufferLayer, util::BoxCloneService, BoxError, Layer, Service, ServiceBuilder,
    ServiceExt,
};
use tower_layer::layer_fn;
use url::Url;

use crate::jwks_cache::{JwksCache, JwksCacheLayer};
use crate::{KeyFetchError, SigningKeySet};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum time between two forced refreshes of a cached key set.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct RateLimitConfig {
    num: u64,
    per: Duration,
}

/// Builder for configuring a [`RemoteKeySet`] with optional caching and rate limiting.
pub struct RemoteKeySetBuilder {
    url: Url,
    cache_time_to_live: Option<Duration>,
    rate_limit_config: Option<RateLimitConfig>,
    timeout: Duration,
    min_refresh_interval: Duration,
    http_client: Option<Client>,
}

impl RemoteKeySetBuilder {
    /// Creates a new builder with the given JWKS URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cache_time_to_live: None,
            rate_limit_config: None,
            timeout: DEFAULT_FETCH_TIMEOUT,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            http_client: None,
        }
    }

    /// Enables caching to avoid re-fetching the remote JWK set on every authorization request.
    pub fn with_cache(mut self, time_to_live: Duration) -> Self {
        self.cache_time_to_live = Some(time_to_live);
        self
    }

    /// Allows at most `num` outgoing JWK set requests per `per` interval. Excess requests wait for capacity, bounded by
    /// the fetch timeout.
    pub fn with_rate_limit(mut self, num: u64, per: Duration) -> Self {
        self.rate_limit_config = Some(RateLimitConfig { num, per });
        self
    }

    /// Upper bound for a single fetch, including time spent waiting on the rate limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long [`RemoteKeySet::refresh`] declines further refreshes after it last dropped the cached set. Only
    /// meaningful together with [`RemoteKeySetBuilder::with_cache`].
    pub fn with_min_refresh_interval(mut self, min_refresh_interval: Duration) -> Self {
        self.min_refresh_interval = min_refresh_interval;
        self
    }

    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Builds the [`RemoteKeySet`] with the configured options.
    ///
    /// When rate limiting is enabled this must be called from within a tokio runtime, since the rate limited service
    /// is driven by a background buffer task.
    pub fn build(self) -> RemoteKeySet {
        let request_service = JwkSetRequestService {
            http_client: self.http_client.unwrap_or_default(),
            url: self.url.clone(),
        };

        let cache = self.cache_time_to_live.map(JwksCache::new);
        let cache_layer = cache.clone().map(JwksCacheLayer::new);

        let rate_limit_layer = self.rate_limit_config.map(|rate_limit_config| {
            layer_fn(move |inner| {
                let rate_limit =
                    tower::limit::RateLimitLayer::new(rate_limit_config.num, rate_limit_config.per);
                let rate_limited_service = rate_limit.layer(inner);

                // Wrap the rate limited service in a buffer service to make it `Clone`.
                let buffered_service = BufferLayer::new(1024).layer(rate_limited_service);

                // Fetch errors pass through the buffer boxed; anything else comes from the buffer itself.
                buffered_service.map_err(|error: BoxError| match error.downcast::<KeyFetchError>() {
                    Ok(error) => *error,
                    Err(_) => KeyFetchError::RateLimited,
                })
            })
        });

        let service_tower = ServiceBuilder::new()
            .option_layer(cache_layer)
            .option_layer(rate_limit_layer)
            .service(request_service);

        RemoteKeySet {
            url: self.url,
            service_tower: Arc::new(Mutex::new(BoxCloneService::new(service_tower))),
            cache,
            timeout: self.timeout,
            min_refresh_interval: self.min_refresh_interval,
            last_refresh: Arc::new(Mutex::new(None)),
        }
    }
}

/// Signing keys fetched from an issuer's JWKS endpoint.
#[derive(Clone)]
pub struct RemoteKeySet {
    url: Url,
    // `BoxCloneService` is not `Sync`; the mutex is only held to clone it.
    service_tower: Arc<Mutex<BoxCloneService<(), Arc<SigningKeySet>, KeyFetchError>>>,
    cache: Option<JwksCache>,
    timeout: Duration,
    min_refresh_interval: Duration,
    last_refresh: Arc<Mutex<Option<Instant>>>,
}

impl RemoteKeySet {
    /// Creates a builder for configuring a [`RemoteKeySet`].
    pub fn builder(url: Url) -> RemoteKeySetBuilder {
        RemoteKeySetBuilder::new(url)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the cached key set, fetching it first if the cache is empty, expired or disabled.
    pub async fn key_set(&self) -> Result<Arc<SigningKeySet>, KeyFetchError> {
        let service = self.service();
        fetch_with_timeout(service, self.timeout).await
    }

    /// Drops the cached key set and fetches a new one.
    ///
    /// Returns `None` when no newer set can be had: without a cache every [`RemoteKeySet::key_set`] call is already a
    /// fresh fetch, and within the minimum refresh interval the cached set is kept as is.
    pub async fn refresh(&self) -> Result<Option<Arc<SigningKeySet>>, KeyFetchError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        if !self.claim_refresh() {
            tracing::debug!(url = %self.url, "JWK set refreshed recently, keeping cached set");
            return Ok(None);
        }

        cache.invalidate().await;
        self.key_set().await.map(Some)
    }

    fn claim_refresh(&self) -> bool {
        let mut last_refresh = self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last_refresh {
            Some(last) if now.duration_since(last) < self.min_refresh_interval => false,
            _ => {
                *last_refresh = Some(now);
                true
            }
        }
    }

    fn service(&self) -> BoxCloneService<(), Arc<SigningKeySet>, KeyFetchError> {
        self.service_tower
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn fetch_with_timeout(
    service: BoxCloneService<(), Arc<SigningKeySet>, KeyFetchError>,
    timeout: Duration,
) -> Result<Arc<SigningKeySet>, KeyFetchError> {
    tokio::time::timeout(timeout, service.oneshot(()))
        .await
        .map_err(|_| KeyFetchError::Timeout)?
}

/// Helper service wrapping a `reqwest::Client` to fetch a JWK Set from a given URL.
#[derive(Clone)]
struct JwkSetRequestService {
    http_client: Client,
    url: Url,
}

impl Service<()> for JwkSetRequestService {
    type Response = Arc<SigningKeySet>;
    type Error = KeyFetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        let http_client = self.http_client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            tracing::debug!(%url, "fetching JWK set");
            let response = http_client.get(url.clone()).send().await?;

            if !response.status().is_success() {
                return Err(KeyFetchError::ErrorResponse {
                    status_code: response.status(),
                });
            }

            let body = response.bytes().await?;
            let jwk_set: JwkSet = serde_json::from_slice(&body).map_err(KeyFetchError::Malformed)?;
            let key_set = SigningKeySet::from(jwk_set);
            tracing::info!(%url, keys = key_set.len(), "fetched JWK set");
            Ok(Arc::new(key_set))
        })
    }
}
