//! Time-bounded cache for fetched feeds.
//!
//! Every key owns a slot guarded by its own async lock. The lock is held
//! across the upstream fetch, so a burst of requests for one key results in
//! a single fetch while other keys proceed independently.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

use crate::error::FetchError;

pub const DEFAULT_TTL_SECS: u32 = 300;

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::seconds(seconds);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

type Slot<V> = Arc<Mutex<Option<CacheEntry<V>>>>;

pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value for `key` while it is younger than the TTL,
    /// otherwise runs `fetch` and stores its result.
    ///
    /// A failed fetch leaves whatever entry was stored untouched. An expired
    /// entry is never returned, even when the refresh fails.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        let slot = self.slot(&key).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.is_fresh(self.clock.now(), self.ttl) {
                tracing::debug!(?key, fetched_at = %cached.fetched_at, "cache hit");
                return Ok(cached.value.clone());
            }
        }

        let value = match fetch().await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(?key, error = %err, "fetch failed, cache left unchanged");
                let empty = entry.is_none();
                drop(entry);
                if empty {
                    self.release(&key, &slot).await;
                }
                return Err(err);
            }
        };

        let fetched_at = self.clock.now();
        tracing::info!(?key, %fetched_at, "cache refreshed");
        *entry = Some(CacheEntry {
            value: value.clone(),
            fetched_at,
        });

        Ok(value)
    }

    /// When the stored entry for `key` was fetched, expired or not.
    pub async fn fetched_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let entry = slot.lock().await;
        entry.as_ref().map(|e| e.fetched_at)
    }

    /// Number of keys holding an entry, expired entries included.
    pub async fn entry_count(&self) -> usize {
        let slots: Vec<Slot<V>> = self.slots.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Number of keys holding a slot, including slots with no entry yet.
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.slots.lock().await;
        slots.entry(key.clone()).or_default().clone()
    }

    /// Drops the slot for `key` if it never got an entry and no other
    /// request is holding or waiting on it.
    async fn release(&self, key: &K, slot: &Slot<V>) {
        let mut slots = self.slots.lock().await;
        let unused = slots.get(key).is_some_and(|stored| Arc::ptr_eq(stored, slot))
            && Arc::strong_count(slot) == 2
            && slot.try_lock().is_ok_and(|entry| entry.is_none());
        if unused {
            slots.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn cache_with_clock() -> (TtlCache<String, String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = TtlCache::new(Duration::seconds(300), clock.clone());
        (cache, clock)
    }

    fn upstream_error() -> FetchError {
        FetchError::Status {
            url: "https://example.test".into(),
            status: 503,
        }
    }

    async fn counted(
        cache: &TtlCache<String, String>,
        key: &str,
        calls: &AtomicUsize,
        value: &str,
    ) -> Result<String, FetchError> {
        cache
            .get_or_fetch(key.to_string(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value.to_string())
            })
            .await
    }

    #[tokio::test]
    async fn repeat_within_ttl_fetches_once() {
        let (cache, clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, "tech", &calls, "v1").await.unwrap(), "v1");
        clock.advance(299);
        assert_eq!(counted(&cache, "tech", &calls, "v2").await.unwrap(), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entry_expires_exactly_at_ttl() {
        let (cache, clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        counted(&cache, "tech", &calls, "v1").await.unwrap();
        clock.advance(300);
        assert_eq!(counted(&cache, "tech", &calls, "v2").await.unwrap(), "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn golang_timeline() {
        let (cache, clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, "golang", &calls, "V1").await.unwrap(), "V1");
        clock.advance(100);
        assert_eq!(counted(&cache, "golang", &calls, "V2").await.unwrap(), "V1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.set(start() + Duration::seconds(301));
        assert_eq!(counted(&cache, "golang", &calls, "V2").await.unwrap(), "V2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            cache.fetched_at(&"golang".to_string()).await,
            Some(start() + Duration::seconds(301))
        );
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_entry() {
        let (cache, clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);
        let key = "news".to_string();

        counted(&cache, "news", &calls, "good").await.unwrap();
        clock.advance(400);

        let err = cache
            .get_or_fetch(key.clone(), || async { Err(upstream_error()) })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(cache.fetched_at(&key).await, Some(start()));

        assert_eq!(counted(&cache, "news", &calls, "fresh").await.unwrap(), "fresh");
        assert_eq!(
            cache.fetched_at(&key).await,
            Some(start() + Duration::seconds(400))
        );
    }

    #[tokio::test]
    async fn failed_first_fetch_stores_nothing() {
        let (cache, _clock) = cache_with_clock();
        let key = "empty".to_string();

        assert!(cache
            .get_or_fetch(key.clone(), || async { Err(upstream_error()) })
            .await
            .is_err());
        assert_eq!(cache.fetched_at(&key).await, None);
        assert_eq!(cache.entry_count().await, 0);
        assert_eq!(cache.slot_count().await, 0);
    }

    #[tokio::test]
    async fn failing_keys_do_not_accumulate() {
        let (cache, _clock) = cache_with_clock();
        let calls = AtomicUsize::new(0);

        for i in 0..10_000 {
            let key = format!("{i}-{}", "x".repeat(1024));
            let result = cache
                .get_or_fetch(key.clone(), move || async move {
                    Err::<String, _>(FetchError::InvalidSubreddit(key))
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(cache.entry_count().await, 0);
        assert_eq!(cache.slot_count().await, 0);

        counted(&cache, "tech", &calls, "t").await.unwrap();
        assert!(cache
            .get_or_fetch("tech".to_string(), || async { Err(upstream_error()) })
            .await
            .is_ok());
        assert_eq!(cache.slot_count().await, 1);
    }

    #[tokio::test]
    async fn waiters_keep_slot_after_failed_fetch() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache: Arc<TtlCache<String, String>> =
            Arc::new(TtlCache::new(Duration::seconds(300), clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("flaky".to_string(), move || async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        if n == 0 {
                            Err(upstream_error())
                        } else {
                            Ok("recovered".to_string())
                        }
                    })
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.slot_count().await, 1);
        assert_eq!(cache.entry_count().await, 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (cache, _clock) = cache_with_clock();
        let tech_calls = AtomicUsize::new(0);
        let sports_calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, "tech", &tech_calls, "t").await.unwrap(), "t");
        assert_eq!(counted(&cache, "sports", &sports_calls, "s").await.unwrap(), "s");
        assert_eq!(counted(&cache, "tech", &tech_calls, "x").await.unwrap(), "t");
        assert_eq!(counted(&cache, "sports", &sports_calls, "x").await.unwrap(), "s");
        assert_eq!(tech_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sports_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count().await, 2);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache: Arc<TtlCache<String, String>> =
            Arc::new(TtlCache::new(Duration::seconds(300), clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("hn".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok("front page".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "front page");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
