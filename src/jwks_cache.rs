use std::{
    future::Future,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

use crate::{KeyFetchError, SigningKeySet};

const JWK_SET_CACHE_KEY: &str = "jwk_set";

/// Shared handle to the cached key set. Cloning is cheap, moka keeps its state behind an `Arc`.
#[derive(Clone)]
pub(crate) struct JwksCache {
    cache: moka::future::Cache<&'static str, Arc<SigningKeySet>>,
}

impl JwksCache {
    pub(crate) fn new(time_to_live: Duration) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(1)
            .time_to_live(time_to_live)
            .build();
        JwksCache { cache }
    }

    /// Returns the cached key set or resolves it with `fetch`. Concurrent misses share a single `fetch`, and a failed
    /// `fetch` leaves the cache empty.
    pub(crate) async fn get_or_fetch<F>(&self, fetch: F) -> Result<Arc<SigningKeySet>, KeyFetchError>
    where
        F: Future<Output = Result<Arc<SigningKeySet>, KeyFetchError>>,
    {
        self.cache
            .try_get_with(JWK_SET_CACHE_KEY, fetch)
            .await
            .map_err(KeyFetchError::from_shared)
    }

    pub(crate) async fn invalidate(&self) {
        self.cache.invalidate(JWK_SET_CACHE_KEY).await;
    }
}

pub(crate) struct JwksCacheLayer {
    cache: JwksCache,
}

impl JwksCacheLayer {
    pub(crate) fn new(cache: JwksCache) -> Self {
        JwksCacheLayer { cache }
    }
}

impl<S> Layer<S> for JwksCacheLayer {
    type Service = JwksCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwksCacheService {
            inner,
            cache: self.cache.clone(),
        }
    }
}

/// Answers from the cache while the entry is alive and only calls the inner service on a miss.
#[derive(Clone)]
pub(crate) struct JwksCacheService<S> {
    inner: S,
    cache: JwksCache,
}

impl<S> Service<()> for JwksCacheService<S>
where
    S: Service<(), Response = Arc<SigningKeySet>, Error = KeyFetchError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Arc<SigningKeySet>;
    type Error = KeyFetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service only matters on a cache miss, so it is awaited inside the future.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        let inner = self.inner.clone();
        let cache = self.cache.clone();
        Box::pin(async move { cache.get_or_fetch(inner.oneshot(())).await })
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use tower::{service_fn, Layer, ServiceExt};

    use super::{JwksCache, JwksCacheLayer};
    use crate::{KeyFetchError, SigningKeySet};

    #[tokio::test]
    async fn test_cache_hit_skips_inner_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, KeyFetchError>(Arc::new(SigningKeySet::default())) }
        });

        let cache = JwksCache::new(Duration::from_secs(60));
        let service = JwksCacheLayer::new(cache.clone()).layer(inner);

        let first = service.clone().oneshot(()).await.unwrap();
        let second = service.clone().oneshot(()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        let third = service.oneshot(()).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<Arc<SigningKeySet>, _>(KeyFetchError::Timeout) }
        });
        let service = JwksCacheLayer::new(JwksCache::new(Duration::from_secs(60))).layer(inner);

        for _ in 0..2 {
            let error = service.clone().oneshot(()).await.unwrap_err();
            assert!(matches!(error.root(), KeyFetchError::Timeout));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = service_fn(move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, KeyFetchError>(Arc::new(SigningKeySet::default()))
            }
        });
        let service = JwksCacheLayer::new(JwksCache::new(Duration::from_secs(60))).layer(inner);

        let key_sets = futures::future::join_all((0..10).map(|_| service.clone().oneshot(()))).await;
        assert!(key_sets.iter().all(Result::is_ok));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
