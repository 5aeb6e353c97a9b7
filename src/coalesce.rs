use std::{future::Future, sync::Arc, time::Duration};

use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::types::CacheKey;
use crate::upstream::UpstreamError;

/// Outcome of a coalesced fetch, shared verbatim with every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("fetch interrupted before completion")]
    Interrupted,
}

type FlightResult = Result<Value, FetchError>;

/// Serves cached values and collapses concurrent misses for the same key into
/// a single upstream fetch.
///
/// A miss registers an in-flight record keyed by [`CacheKey`]; every caller
/// arriving while it exists subscribes to the same result channel. The fetch
/// itself runs in a spawned task, so it completes and populates the cache
/// even after every waiter has disconnected.
#[derive(Clone)]
pub struct FetchCoordinator {
    cache: CacheStore,
    flights: Arc<DashMap<CacheKey, broadcast::Sender<FlightResult>>>,
}

impl FetchCoordinator {
    pub fn new(cache: CacheStore) -> Self {
        Self {
            cache,
            flights: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Return the cached value for `key`, or the result of exactly one
    /// upstream fetch shared by every concurrent caller of this key.
    ///
    /// `fetch` is only invoked by the caller that starts the flight.
    pub async fn resolve<F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch: F) -> FlightResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, UpstreamError>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(key) {
            debug!(%key, "cache hit");
            return Ok(value);
        }

        let mut rx = match self.flights.entry(key.clone()) {
            Entry::Occupied(flight) => {
                debug!(%key, "joining in-flight fetch");
                flight.get().subscribe()
            }
            Entry::Vacant(slot) => {
                // The flight that caused our miss may have landed between the
                // cache check and taking the entry lock.
                if let Some(value) = self.cache.get(key) {
                    return Ok(value);
                }
                let (tx, rx) = broadcast::channel(1);
                slot.insert(tx.clone());
                self.spawn_flight(key.clone(), ttl, fetch(), tx);
                rx
            }
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Interrupted),
        }
    }

    fn spawn_flight<Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: Fut,
        tx: broadcast::Sender<FlightResult>,
    ) where
        Fut: Future<Output = Result<Value, UpstreamError>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let flights = self.flights.clone();

        tokio::spawn(async move {
            let outcome: FlightResult = match fetch.await {
                Ok(value) => {
                    cache.set(key.clone(), value.clone(), ttl);
                    Ok(value)
                }
                // Failures are never cached; the next miss retries upstream.
                Err(e) => {
                    warn!(%key, status = e.status(), error = %e, "upstream fetch failed");
                    Err(FetchError::Upstream(e))
                }
            };

            // Deregister before publishing so a caller that misses the
            // broadcast finds either the cached value or no flight at all.
            flights.remove(&key);
            let _ = tx.send(outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::join_all;
    use serde_json::json;
    use tokio::time::{advance, sleep};

    use super::*;

    fn coordinator() -> FetchCoordinator {
        FetchCoordinator::new(CacheStore::new(16))
    }

    fn key() -> CacheKey {
        CacheKey::snapshot("bitcoin")
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            waiters.push(async move {
                coordinator
                    .resolve(&key(), Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(json!({"price": 42}))
                    })
                    .await
            });
        }

        let results = join_all(waiters).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), json!({"price": 42}));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_within_ttl_skips_upstream() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut payloads = Vec::new();
        for _ in 0..2 {
            let calls = calls.clone();
            let result = coordinator
                .resolve(&key(), Duration::from_secs(300), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"id": "bitcoin"}))
                })
                .await;
            payloads.push(result.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(payloads[0], payloads[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_fresh_fetch() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            coordinator
                .resolve(&key(), Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(1))
                })
                .await
                .unwrap();
            advance(Duration::from_secs(60)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_fans_out_to_all_waiters_and_is_not_cached() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            waiters.push(async move {
                coordinator
                    .resolve(&key(), Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        Err(UpstreamError::Status {
                            status: 429,
                            body: "rate limited".into(),
                        })
                    })
                    .await
            });
        }

        let results = join_all(waiters).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(
                result.unwrap_err(),
                FetchError::Upstream(UpstreamError::Status {
                    status: 429,
                    body: "rate limited".into(),
                })
            );
        }
        assert!(coordinator.cache().get(&key()).is_none());

        // The next request for the same key retries upstream.
        let calls_after = calls.clone();
        let result = coordinator
            .resolve(&key(), Duration::from_secs(60), move || async move {
                calls_after.fetch_add(1, Ordering::SeqCst);
                Ok(json!(7))
            })
            .await;

        assert_eq!(result.unwrap(), json!(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flight_completes_after_caller_disconnects() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                coordinator
                    .resolve(&key(), Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_secs(5)).await;
                        Ok(json!({"cached": true}))
                    })
                    .await
            })
        };

        // Let the flight register, then drop the only waiter.
        tokio::task::yield_now().await;
        waiter.abort();

        sleep(Duration::from_secs(6)).await;
        assert_eq!(coordinator.cache().get(&key()), Some(json!({"cached": true})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
