//! Time-boxed, stale-on-error cache in front of a remote fetch operation.
//!
//! A [`CachedFetcher`] wraps one [`Fetch`] implementation and answers
//! [`CachedFetcher::get`] with:
//!
//! - the cached value while it is younger than the TTL (no remote call);
//! - a freshly fetched value otherwise, which replaces the cached one;
//! - the previous value, marked [`Source::Stale`], when the refresh fails;
//! - an error only when the refresh fails and nothing was ever cached.
//!
//! Refreshes are single-flight. A caller that arrives while a refresh is in
//! progress gets the stale value straight away if there is one; with an empty
//! cache it waits for that refresh and shares its outcome rather than issuing
//! a remote call of its own.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// A remote operation whose result is worth caching.
pub trait Fetch: Send + Sync {
    type Output: Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short name used in log lines, e.g. `"channel-stats"`.
    fn name(&self) -> &'static str;

    fn fetch(&self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Whether a successful result should replace the cache entry.
    ///
    /// Results that fail this check are handed back to the caller when there is
    /// nothing better, but never cached.
    fn is_meaningful(&self, _value: &Self::Output) -> bool {
        true
    }
}

/// Why [`CachedFetcher::get`] could not produce any value.
#[derive(Debug, Error)]
pub enum FetchFailure<E: std::error::Error + 'static> {
    #[error("remote fetch failed: {0}")]
    Remote(#[source] E),

    #[error("remote fetch timed out after {0:?}")]
    TimedOut(Duration),

    /// A refresh started by another caller, which this one waited on, failed.
    #[error("concurrent refresh failed")]
    Concurrent,
}

/// Where the value returned by [`CachedFetcher::get`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from a cache entry younger than the TTL.
    Cache,
    /// Fetched from the remote side during this call.
    Remote,
    /// The refresh failed; this is the last good value.
    Stale,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Remote => "miss",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value handed out by the cache plus its provenance.
#[derive(Debug)]
pub struct Lookup<T> {
    pub value: Arc<T>,
    pub source: Source,
}

/// The single cached value of a fetcher.
///
/// `data` and `fetched_at` are always both `Some` or both `None`.
struct CacheEntry<T> {
    data: Option<Arc<T>>,
    fetched_at: Option<Instant>,
}

impl<T> CacheEntry<T> {
    fn empty() -> Self {
        Self {
            data: None,
            fetched_at: None,
        }
    }

    fn fresh(&self, ttl: Duration, now: Instant) -> Option<Arc<T>> {
        let fetched_at = self.fetched_at?;
        if now.saturating_duration_since(fetched_at) < ttl {
            self.data.clone()
        } else {
            None
        }
    }
}

/// Tuning for a [`CachedFetcher`].
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    /// How long a successful result is served without asking the remote side.
    /// Zero disables caching entirely.
    pub ttl: Duration,
    /// Upper bound on a single remote call.
    pub fetch_timeout: Duration,
}

/// Wraps a [`Fetch`] with a TTL cache and stale-on-error fallback.
pub struct CachedFetcher<F: Fetch> {
    fetcher: F,
    policy: CachePolicy,
    entry: RwLock<CacheEntry<F::Output>>,
    refresh: Mutex<()>,
    // Bumped after every completed remote attempt.
    attempts: AtomicU64,
}

impl<F: Fetch> CachedFetcher<F> {
    pub fn new(fetcher: F, policy: CachePolicy) -> Self {
        Self {
            fetcher,
            policy,
            entry: RwLock::new(CacheEntry::empty()),
            refresh: Mutex::new(()),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.fetcher.name()
    }

    /// Returns the cached value if fresh, otherwise refreshes it.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure`] only when the refresh fails and no value has
    /// ever been cached; callers that waited on another caller's failed
    /// refresh get [`FetchFailure::Concurrent`]. Every other failure is absorbed into a
    /// [`Source::Stale`] result.
    pub async fn get(&self) -> Result<Lookup<F::Output>, FetchFailure<F::Error>> {
        if let Some(value) = self.cached_fresh().await {
            debug!(fetcher = self.name(), "cache hit");
            return Ok(Lookup {
                value,
                source: Source::Cache,
            });
        }

        let attempts_seen = self.attempts.load(Ordering::Acquire);
        let _guard = match self.refresh.try_lock() {
            Ok(guard) => {
                // A refresh may have finished since the first check.
                if let Some(value) = self.cached_fresh().await {
                    return Ok(Lookup {
                        value,
                        source: Source::Cache,
                    });
                }
                guard
            }
            Err(_) => {
                // A refresh is running; never queue behind it when there is
                // something to serve.
                if let Some(stale) = self.last_good().await {
                    debug!(fetcher = self.name(), "refresh in progress, serving stale data");
                    return Ok(Lookup {
                        value: stale,
                        source: Source::Stale,
                    });
                }

                let guard = self.refresh.lock().await;
                if let Some(value) = self.cached_fresh().await {
                    debug!(fetcher = self.name(), "refreshed by a concurrent caller");
                    return Ok(Lookup {
                        value,
                        source: Source::Cache,
                    });
                }
                if self.attempts.load(Ordering::Acquire) != attempts_seen {
                    // The refresh we waited for came back with nothing usable.
                    return match self.last_good().await {
                        Some(stale) => Ok(Lookup {
                            value: stale,
                            source: Source::Stale,
                        }),
                        None => Err(FetchFailure::Concurrent),
                    };
                }
                guard
            }
        };

        info!(fetcher = self.name(), "fetching from remote");
        let outcome = match timeout(self.policy.fetch_timeout, self.fetcher.fetch()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FetchFailure::Remote(e)),
            Err(_) => Err(FetchFailure::TimedOut(self.policy.fetch_timeout)),
        };
        self.attempts.fetch_add(1, Ordering::Release);

        match outcome {
            Ok(value) if self.fetcher.is_meaningful(&value) => {
                let value = Arc::new(value);
                let mut entry = self.entry.write().await;
                entry.data = Some(Arc::clone(&value));
                entry.fetched_at = Some(Instant::now());
                Ok(Lookup {
                    value,
                    source: Source::Remote,
                })
            }
            Ok(value) => match self.last_good().await {
                Some(stale) => {
                    warn!(
                        fetcher = self.name(),
                        "remote returned an empty result, serving stale data"
                    );
                    Ok(Lookup {
                        value: stale,
                        source: Source::Stale,
                    })
                }
                None => {
                    warn!(
                        fetcher = self.name(),
                        "remote returned an empty result, not caching it"
                    );
                    Ok(Lookup {
                        value: Arc::new(value),
                        source: Source::Remote,
                    })
                }
            },
            Err(failure) => match self.last_good().await {
                Some(stale) => {
                    warn!(
                        fetcher = self.name(),
                        error = %failure,
                        "refresh failed, serving stale data"
                    );
                    Ok(Lookup {
                        value: stale,
                        source: Source::Stale,
                    })
                }
                None => {
                    warn!(
                        fetcher = self.name(),
                        error = %failure,
                        "refresh failed and nothing is cached"
                    );
                    Err(failure)
                }
            },
        }
    }

    async fn cached_fresh(&self) -> Option<Arc<F::Output>> {
        self.entry
            .read()
            .await
            .fresh(self.policy.ttl, Instant::now())
    }

    async fn last_good(&self) -> Option<Arc<F::Output>> {
        self.entry.read().await.data.clone()
    }
}

/// Object-safe handle used to warm every fetcher regardless of its output type.
pub trait Warm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs one [`CachedFetcher::get`], reporting only whether it produced a value.
    fn warm(&self) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>>;
}

impl<F: Fetch> Warm for CachedFetcher<F> {
    fn name(&self) -> &'static str {
        CachedFetcher::name(self)
    }

    fn warm(&self) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send + '_>> {
        Box::pin(async move { self.get().await.map(|_| ()).map_err(|e| e.to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    #[error("remote unavailable")]
    struct Unavailable;

    #[derive(Debug, Clone, PartialEq)]
    struct Stats {
        subscribers: String,
    }

    /// Fake remote: counts calls, can be switched to failing or hanging, can be
    /// slowed down.
    #[derive(Clone, Default)]
    struct FakeRemote {
        calls: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
        hanging: Arc<AtomicBool>,
        value: Arc<std::sync::Mutex<String>>,
        delay: Option<Duration>,
    }

    impl FakeRemote {
        fn returning(value: &str) -> Self {
            let fake = Self::default();
            *fake.value.lock().unwrap() = value.to_string();
            fake
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        fn hang(&self) {
            self.hanging.store(true, Ordering::SeqCst);
        }

        fn set_value(&self, value: &str) {
            *self.value.lock().unwrap() = value.to_string();
        }
    }

    impl Fetch for FakeRemote {
        type Output = Stats;
        type Error = Unavailable;

        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch(&self) -> Result<Stats, Unavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hanging.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(Unavailable);
            }
            Ok(Stats {
                subscribers: self.value.lock().unwrap().clone(),
            })
        }

        fn is_meaningful(&self, value: &Stats) -> bool {
            !value.subscribers.is_empty()
        }
    }

    fn policy(ttl_secs: u64) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(ttl_secs),
            fetch_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_then_stale_after_expiry() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(3600));

        let first = cache.get().await.unwrap();
        assert_eq!(first.source, Source::Remote);
        assert_eq!(first.value.subscribers, "100");
        assert_eq!(remote.calls(), 1);

        tokio::time::advance(Duration::from_secs(1800)).await;
        let second = cache.get().await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(*second.value, *first.value);
        assert_eq!(remote.calls(), 1);

        tokio::time::advance(Duration::from_secs(1900)).await;
        remote.fail();
        let third = cache.get().await.unwrap();
        assert_eq!(third.source, Source::Stale);
        assert_eq!(third.value.subscribers, "100");
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_with_empty_cache_is_an_error() {
        let remote = FakeRemote::returning("100");
        remote.fail();
        let cache = CachedFetcher::new(remote.clone(), policy(3600));

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, FetchFailure::Remote(Unavailable)));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_does_not_reset_the_clock() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(60));
        cache.get().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        remote.fail();
        assert_eq!(cache.get().await.unwrap().source, Source::Stale);
        // still expired, so the next call tries again
        assert_eq!(cache.get().await.unwrap().source, Source::Stale);
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_with_healthy_remote_replaces_value() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(60));
        cache.get().await.unwrap();

        remote.set_value("250");
        tokio::time::advance(Duration::from_secs(60)).await;
        let refreshed = cache.get().await.unwrap();
        assert_eq!(refreshed.source, Source::Remote);
        assert_eq!(refreshed.value.subscribers, "250");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_always_refetches() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(0));

        for _ in 0..3 {
            assert_eq!(cache.get().await.unwrap().source, Source::Remote);
        }
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_refetches_keep_data_equal() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(0));

        let a = cache.get().await.unwrap();
        let b = cache.get().await.unwrap();
        assert_eq!(*a.value, *b.value);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_returned_but_not_cached() {
        let remote = FakeRemote::returning("");
        let cache = CachedFetcher::new(remote.clone(), policy(3600));

        let lookup = cache.get().await.unwrap();
        assert_eq!(lookup.source, Source::Remote);
        assert!(lookup.value.subscribers.is_empty());

        cache.get().await.unwrap();
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_after_good_one_serves_stale() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(60));
        cache.get().await.unwrap();

        remote.set_value("");
        tokio::time::advance(Duration::from_secs(120)).await;
        let lookup = cache.get().await.unwrap();
        assert_eq!(lookup.source, Source::Stale);
        assert_eq!(lookup.value.subscribers, "100");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_remote_times_out() {
        let remote = FakeRemote {
            delay: Some(Duration::from_secs(30)),
            ..FakeRemote::returning("100")
        };
        let cache = CachedFetcher::new(
            remote.clone(),
            CachePolicy {
                ttl: Duration::from_secs(60),
                fetch_timeout: Duration::from_secs(5),
            },
        );

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, FetchFailure::TimedOut(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_primed_cache_serves_stale() {
        let remote = FakeRemote::returning("100");
        let cache = CachedFetcher::new(remote.clone(), policy(60));
        cache.get().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        remote.hang();
        let started = Instant::now();
        let lookup = cache.get().await.unwrap();

        assert_eq!(lookup.source, Source::Stale);
        assert_eq!(lookup.value.subscribers, "100");
        assert!(started.elapsed() <= Duration::from_secs(11));
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callers_during_a_hung_refresh_get_stale_without_queueing() {
        let remote = FakeRemote::returning("100");
        let cache = Arc::new(CachedFetcher::new(remote.clone(), policy(60)));
        cache.get().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        remote.hang();

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    let started = Instant::now();
                    let source = cache.get().await.map(|l| l.source);
                    (source, started.elapsed())
                })
            })
            .collect();

        for task in tasks {
            let (source, waited) = task.await.unwrap();
            assert_eq!(source.unwrap(), Source::Stale);
            assert!(waited <= Duration::from_secs(11), "waited {waited:?}");
        }
        // one priming call plus a single refresh attempt
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_share_a_failed_refresh_instead_of_retrying() {
        let remote = FakeRemote {
            delay: Some(Duration::from_millis(100)),
            ..FakeRemote::returning("100")
        };
        remote.fail();
        let cache = Arc::new(CachedFetcher::new(remote.clone(), policy(3600)));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await.map(|_| ()) })
            })
            .collect();

        let mut remote_errors = 0;
        let mut shared_errors = 0;
        for task in tasks {
            match task.await.unwrap() {
                Err(FetchFailure::Remote(Unavailable)) => remote_errors += 1,
                Err(FetchFailure::Concurrent) => shared_errors += 1,
                other => panic!("expected a failure, got {other:?}"),
            }
        }
        assert_eq!((remote_errors, shared_errors), (1, 3));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_remote_call() {
        let remote = FakeRemote {
            delay: Some(Duration::from_millis(100)),
            ..FakeRemote::returning("100")
        };
        let cache = Arc::new(CachedFetcher::new(remote.clone(), policy(3600)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await.map(|l| l.value.subscribers.clone()) })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "100");
        }
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warm_reports_failure_as_message() {
        let remote = FakeRemote::returning("100");
        remote.fail();
        let cache = CachedFetcher::new(remote, policy(60));
        let warm: &dyn Warm = &cache;

        assert_eq!(warm.name(), "fake");
        assert_eq!(warm.warm().await.unwrap_err(), "remote fetch failed: remote unavailable");
    }

    #[test]
    fn source_labels() {
        assert_eq!(Source::Cache.to_string(), "hit");
        assert_eq!(Source::Remote.to_string(), "miss");
        assert_eq!(Source::Stale.to_string(), "stale");
    }
}
