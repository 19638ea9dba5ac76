//! Scoped query cache for workflow data.
//!
//! Uses moka's concurrent cache for storage and eviction. Entries are keyed
//! by [`QueryKey`]; invalidation and removal take a scope and reach every key
//! the scope is a prefix of.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use moka::{ops::compute::Op, sync::Cache};
use tokio::{sync::broadcast, time::Instant};
use tracing::trace;

use crate::{
    CacheConfig, FlowsyncError, Result,
    common::BroadcastQueue,
    keys::QueryKey,
    model::{Workflow, WorkflowExecution, WorkflowTemplate},
};

const EVENT_QUEUE_SIZE: usize = 256;

/// A cached payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheData {
    Workflows(Arc<Vec<Workflow>>),
    Workflow(Arc<Workflow>),
    Executions(Arc<Vec<WorkflowExecution>>),
    Templates(Arc<Vec<WorkflowTemplate>>),
}

/// Types that can live in the cache.
pub trait Cached: Sized {
    fn into_data(self) -> CacheData;

    fn from_data(data: &CacheData) -> Option<Self>;
}

macro_rules! impl_cached {
    ($ty:ty, $variant:ident) => {
        impl Cached for $ty {
            fn into_data(self) -> CacheData {
                CacheData::$variant(Arc::new(self))
            }

            fn from_data(data: &CacheData) -> Option<Self> {
                match data {
                    CacheData::$variant(v) => Some((**v).clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_cached!(Vec<Workflow>, Workflows);
impl_cached!(Workflow, Workflow);
impl_cached!(Vec<WorkflowExecution>, Executions);
impl_cached!(Vec<WorkflowTemplate>, Templates);

/// Change notifications, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// Entries under the scope were marked stale and should be refetched by active observers.
    Invalidated(QueryKey),
    /// Entries under the scope were dropped.
    Removed(QueryKey),
    /// One entry was written.
    Updated(QueryKey),
}

/// A cache change declared by a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEffect {
    Invalidate(QueryKey),
    Remove(QueryKey),
    /// Silent write of exactly one entry.
    Overwrite(QueryKey, CacheData),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: CacheData,
    stale: bool,
    updated_at: Instant,
}

type SharedFetch = Shared<BoxFuture<'static, Result<CacheData>>>;

struct InFlight {
    fetch: SharedFetch,
    /// set when the scope was invalidated while the request was running
    discard: Arc<AtomicBool>,
}

/// Query cache with scoped invalidation and request de-duplication.
#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<QueryKey, CacheEntry>,
    inflight: Arc<Mutex<HashMap<QueryKey, InFlight>>>,
    events: Arc<BroadcastQueue<CacheEvent>>,
    stale_time: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueryCache {
    /// Allocate a new [`QueryCache`].
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder().max_capacity(config.capacity).time_to_idle(config.gc_time()).build();

        Self {
            entries,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            events: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            stale_time: config.stale_time(),
        }
    }

    /// Cached value for `key`, fresh or not.
    pub fn get<T: Cached>(
        &self,
        key: &QueryKey,
    ) -> Option<T> {
        self.entries.get(key).and_then(|e| T::from_data(&e.data))
    }

    /// Cached value for `key` only while it is fresh.
    pub fn get_fresh<T: Cached>(
        &self,
        key: &QueryKey,
    ) -> Option<T> {
        if self.is_fresh(key) { self.get(key) } else { None }
    }

    /// Present, not invalidated and younger than the stale time.
    pub fn is_fresh(
        &self,
        key: &QueryKey,
    ) -> bool {
        self.entries.get(key).is_some_and(|e| !e.stale && e.updated_at.elapsed() < self.stale_time)
    }

    pub fn contains(
        &self,
        key: &QueryKey,
    ) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set(
        &self,
        key: QueryKey,
        data: CacheData,
    ) {
        trace!(%key, "cache::set");
        let entry = CacheEntry {
            data,
            stale: false,
            updated_at: Instant::now(),
        };
        // same per-key lock as `invalidate`, so a stale flip never resurrects older data
        let _ = self.entries.entry(key.clone()).and_compute_with(|_| Op::Put(entry));
        let _ = self.events.send(CacheEvent::Updated(key));
    }

    /// Mark every entry under `scope` stale and notify observers.
    pub fn invalidate(
        &self,
        scope: &QueryKey,
    ) {
        trace!(%scope, "cache::invalidate");
        self.discard_inflight(scope);
        for key in self.keys_under(scope) {
            let _ = self.entries.entry(key).and_compute_with(|current| match current {
                Some(current) => {
                    let mut entry = current.into_value();
                    entry.stale = true;
                    Op::Put(entry)
                }
                None => Op::Nop,
            });
        }
        let _ = self.events.send(CacheEvent::Invalidated(scope.clone()));
    }

    /// Drop every entry under `scope`.
    pub fn remove(
        &self,
        scope: &QueryKey,
    ) {
        trace!(%scope, "cache::remove");
        self.discard_inflight(scope);
        for key in self.keys_under(scope) {
            self.entries.invalidate(&key);
        }
        let _ = self.events.send(CacheEvent::Removed(scope.clone()));
    }

    pub fn apply(
        &self,
        effect: CacheEffect,
    ) {
        match effect {
            CacheEffect::Invalidate(scope) => self.invalidate(&scope),
            CacheEffect::Remove(scope) => self.remove(&scope),
            CacheEffect::Overwrite(key, data) => self.set(key, data),
        }
    }

    /// Subscribe to cache change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Run `fetcher` and store its result under `key`.
    ///
    /// Concurrent calls for the same key share one request: only the first
    /// caller's fetcher runs, the rest wait on its result. A result whose
    /// scope was invalidated mid-flight is returned but not stored.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        fetcher: F,
    ) -> Result<T>
    where
        T: Cached + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetch = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(&key) {
                Some(f) => {
                    trace!(%key, "cache::fetch joined in-flight request");
                    f.fetch.clone()
                }
                None => {
                    let discard = Arc::new(AtomicBool::new(false));
                    let fetch = self.store_on_completion(key.clone(), fetcher(), discard.clone());
                    inflight.insert(
                        key.clone(),
                        InFlight {
                            fetch: fetch.clone(),
                            discard,
                        },
                    );
                    fetch
                }
            }
        };

        let data = fetch.await?;
        T::from_data(&data).ok_or(FlowsyncError::Cache(format!("unexpected cached type under {}", key)))
    }

    fn store_on_completion<T, Fut>(
        &self,
        key: QueryKey,
        request: Fut,
        discard: Arc<AtomicBool>,
    ) -> SharedFetch
    where
        T: Cached + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let cache = self.clone();
        async move {
            let result = request.await.map(Cached::into_data);
            if !discard.load(Ordering::Acquire) {
                lock(&cache.inflight).remove(&key);
                if let Ok(data) = &result {
                    cache.set(key, data.clone());
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    fn discard_inflight(
        &self,
        scope: &QueryKey,
    ) {
        lock(&self.inflight).retain(|key, f| {
            if scope.is_prefix_of(key) {
                f.discard.store(true, Ordering::Release);
                false
            } else {
                true
            }
        });
    }

    fn keys_under(
        &self,
        scope: &QueryKey,
    ) -> Vec<QueryKey> {
        self.entries.iter().filter(|(k, _)| scope.is_prefix_of(k)).map(|(k, _)| k.as_ref().clone()).collect()
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use crate::{
        CacheConfig,
        common::cache::{CacheData, CacheEvent, Cached, QueryCache},
        keys::WorkflowKeys,
        model::{WorkflowExecution, WorkflowTemplate},
    };

    fn cache() -> QueryCache {
        QueryCache::new(&CacheConfig::default())
    }

    fn executions() -> CacheData {
        Vec::<WorkflowExecution>::new().into_data()
    }

    #[test]
    fn test_set_and_get() {
        let cache = cache();
        let key = WorkflowKeys::executions("w1");
        cache.set(key.clone(), executions());
        assert!(cache.is_fresh(&key));
        assert_eq!(cache.get::<Vec<WorkflowExecution>>(&key), Some(vec![]));
        assert!(cache.get::<Vec<crate::model::Workflow>>(&key).is_none());
    }

    #[test]
    fn test_remove_detail_cascades_to_executions() {
        let cache = cache();
        let executions_key = WorkflowKeys::executions("w1");
        let other = WorkflowKeys::executions("w2");
        cache.set(executions_key.clone(), executions());
        cache.set(other.clone(), executions());
        assert!(cache.is_fresh(&executions_key));

        cache.remove(&WorkflowKeys::detail("w1"));
        assert!(!cache.is_fresh(&executions_key));
        assert!(!cache.contains(&executions_key));
        assert!(cache.is_fresh(&other));
    }

    #[test]
    fn test_invalidate_marks_stale_but_keeps_data() {
        let cache = cache();
        let list = WorkflowKeys::list(Some("p1"), false);
        let executions_key = WorkflowKeys::executions("w1");
        cache.set(list.clone(), Vec::<crate::model::Workflow>::new().into_data());
        cache.set(executions_key.clone(), executions());

        cache.invalidate(&WorkflowKeys::lists());
        assert!(!cache.is_fresh(&list));
        assert!(cache.get::<Vec<crate::model::Workflow>>(&list).is_some());
        assert!(cache.get_fresh::<Vec<crate::model::Workflow>>(&list).is_none());
        assert!(cache.is_fresh(&executions_key));
    }

    fn templates(usage_count: u64) -> CacheData {
        vec![WorkflowTemplate {
            id: "t1".to_string(),
            name: "Concept test".to_string(),
            description: None,
            category: None,
            canvas_data: Default::default(),
            tags: vec![],
            usage_count,
        }]
        .into_data()
    }

    #[test]
    fn test_invalidate_missing_key_inserts_nothing() {
        let cache = cache();
        let key = WorkflowKeys::executions("w1");
        cache.invalidate(&key);
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_invalidate_racing_set_keeps_newest_data() {
        let cache = cache();
        let key = WorkflowKeys::templates();
        cache.set(key.clone(), templates(0));

        for i in 1..200 {
            let writer = {
                let cache = cache.clone();
                let key = key.clone();
                std::thread::spawn(move || cache.set(key, templates(i)))
            };
            cache.invalidate(&key);
            writer.join().unwrap();
            let current = cache.get::<Vec<WorkflowTemplate>>(&key).unwrap();
            assert_eq!(current[0].usage_count, i);
        }
    }

    #[test]
    fn test_events_are_broadcast() {
        let cache = cache();
        let mut events = cache.subscribe();
        cache.invalidate(&WorkflowKeys::all());
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Invalidated(WorkflowKeys::all()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_go_stale_after_stale_time() {
        let cache = QueryCache::new(&CacheConfig {
            stale_time_ms: 1_000,
            ..CacheConfig::default()
        });
        let key = WorkflowKeys::executions("w1");
        cache.set(key.clone(), executions());
        assert!(cache.is_fresh(&key));
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert!(!cache.is_fresh(&key));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = WorkflowKeys::executions("w1");

        let fetch = |calls: Arc<AtomicUsize>| {
            let cache = cache.clone();
            let key = key.clone();
            async move {
                cache
                    .fetch(key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(Vec::<WorkflowExecution>::new())
                    })
                    .await
            }
        };

        let (a, b) = tokio::join!(fetch(calls.clone()), fetch(calls.clone()));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_fresh(&key));
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let cache = cache();
        let key = WorkflowKeys::executions("w1");
        let result: crate::Result<Vec<WorkflowExecution>> = cache.fetch(key.clone(), || async { Err(crate::FlowsyncError::Network("down".into())) }).await;
        assert!(result.is_err());
        assert!(!cache.contains(&key));
    }
}
