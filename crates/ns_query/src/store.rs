use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use ns_core::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::key::QueryKey;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type QueryData = Arc<dyn Any + Send + Sync>;
type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<QueryData>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// How long a successful result is served without asking the backend.
    pub stale_after: Duration,
    /// A fetch still pending after this long settles as [`Error::Timeout`].
    pub request_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// A typed query: the key it is cached under and how to fetch it.
pub struct Query<T> {
    key: QueryKey,
    fetcher: ErasedFetcher,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn new<F, Fut>(key: QueryKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetcher: ErasedFetcher = Arc::new(move || {
            let fut = fetch();
            Box::pin(async move { fut.await.map(|data| Arc::new(data) as QueryData) })
        });
        Self {
            key,
            fetcher,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("key", &self.key.to_string()).finish()
    }
}

#[derive(Clone)]
struct Snapshot {
    status: QueryStatus,
    data: Option<QueryData>,
    /// Outcome of the last settled request, cleared on success.
    error: Option<Error>,
    updated_at: Option<DateTime<Utc>>,
    is_stale: bool,
    is_fetching: bool,
}

impl Snapshot {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            is_stale: true,
            is_fetching: false,
        }
    }

    fn typed<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryResult<T> {
        let data = self.data.clone().and_then(|data| match data.downcast::<T>() {
            Ok(data) => Some(data),
            Err(_) => {
                warn!("⚠️ {} holds a different type than requested", key);
                None
            }
        });
        QueryResult {
            status: self.status,
            data,
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_stale: self.is_stale,
            is_fetching: self.is_fetching,
        }
    }
}

/// What a view sees for one key.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    error: Option<Error>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub is_fetching: bool,
}

impl<T> QueryResult<T> {
    /// First load in progress, nothing to show yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// The failure to show inline. Authentication failures are handled by
    /// the session and never show up here.
    pub fn error(&self) -> Option<&Error> {
        self.error
            .as_ref()
            .filter(|err| self.is_error() && !err.is_unauthorized())
    }
}

struct Entry {
    state: watch::Sender<Snapshot>,
    fetcher: Option<ErasedFetcher>,
    in_flight: Option<u64>,
    observers: usize,
    fetched_at: Option<Instant>,
    invalidated: bool,
}

impl Entry {
    fn new() -> Self {
        let (state, _) = watch::channel(Snapshot::idle());
        Self {
            state,
            fetcher: None,
            in_flight: None,
            observers: 0,
            fetched_at: None,
            invalidated: false,
        }
    }

    fn is_fresh(&self, stale_after: Duration) -> bool {
        !self.invalidated
            && self.state.borrow().status == QueryStatus::Success
            && self
                .fetched_at
                .map_or(false, |at| at.elapsed() < stale_after)
    }
}

struct StoreInner {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    config: StoreConfig,
    next_request: AtomicU64,
}

impl StoreInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a request for `entry` on a spawned task. The task writes its
    /// result back only if no newer request was issued for the key meanwhile.
    fn start_request(self: &Arc<Self>, key: &QueryKey, entry: &mut Entry) {
        let Some(fetcher) = entry.fetcher.clone() else {
            debug!("🗂️ {} has no fetcher registered, nothing to refetch", key);
            return;
        };
        let id = self.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(previous) = entry.in_flight.replace(id) {
            debug!("🔁 {} request #{} supersedes #{}", key, id, previous);
        } else {
            debug!("📡 {} request #{}", key, id);
        }
        entry.state.send_modify(|s| {
            s.is_fetching = true;
            if s.data.is_none() {
                s.status = QueryStatus::Loading;
            }
        });

        let store = Arc::downgrade(self);
        let key = key.clone();
        let timeout = self.config.request_timeout;
        tokio::spawn(async move {
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, fetcher())
                    .await
                    .unwrap_or_else(|_| Err(Error::Timeout(limit.as_secs()))),
                None => fetcher().await,
            };
            if let Some(store) = store.upgrade() {
                store.settle(&key, id, result);
            }
        });
    }

    fn settle(&self, key: &QueryKey, id: u64, result: Result<QueryData>) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            debug!("🗑️ {} was evicted, dropping response #{}", key, id);
            return;
        };
        if entry.in_flight != Some(id) {
            debug!("⏭️ {} response #{} arrived after a newer request, discarded", key, id);
            return;
        }
        entry.in_flight = None;
        match result {
            Ok(data) => {
                entry.fetched_at = Some(Instant::now());
                entry.invalidated = false;
                entry.state.send_modify(|s| {
                    s.status = QueryStatus::Success;
                    s.data = Some(data);
                    s.error = None;
                    s.updated_at = Some(Utc::now());
                    s.is_stale = false;
                    s.is_fetching = false;
                });
                debug!("✅ {} updated by response #{}", key, id);
            }
            Err(Error::Unauthorized) => {
                // The entry must not read as failed: fall back to whatever
                // the data supports and leave the error for `fetch` callers.
                entry.invalidated = true;
                entry.state.send_modify(|s| {
                    s.status = if s.data.is_some() {
                        QueryStatus::Success
                    } else {
                        QueryStatus::Idle
                    };
                    s.error = Some(Error::Unauthorized);
                    s.is_stale = true;
                    s.is_fetching = false;
                });
                debug!("🔒 {} rejected as unauthorized, left to the session", key);
            }
            Err(err) => {
                warn!("❌ {} failed: {}", key, err);
                entry.state.send_modify(|s| {
                    s.status = QueryStatus::Error;
                    s.error = Some(err);
                    s.is_fetching = false;
                });
            }
        }
    }

    fn release(&self, key: &QueryKey) {
        if let Some(entry) = self.entries().get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }
}

/// Process-wide cache of query results.
///
/// Cloning the store is cheap; every clone shares the same entries.
#[derive(Clone)]
pub struct QueryStore {
    inner: Arc<StoreInner>,
}

impl QueryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(HashMap::new()),
                config,
                next_request: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns fresh data for `query`, fetching it (or joining the request
    /// already in flight for the same key) when the cache can't serve it.
    pub async fn fetch<T: Send + Sync + 'static>(&self, query: Query<T>) -> Result<Arc<T>> {
        let key = query.key.clone();
        let mut rx = {
            let mut entries = self.inner.entries();
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.fetcher = Some(query.fetcher);
            if entry.is_fresh(self.inner.config.stale_after) {
                debug!("📦 {} served from cache", key);
                return entry.state.borrow().typed::<T>(&key).data.ok_or_else(|| type_mismatch(&key));
            }
            if entry.in_flight.is_none() {
                self.inner.start_request(&key, entry);
            } else {
                debug!("🔗 {} joins the request in flight", key);
            }
            entry.state.subscribe()
        };

        loop {
            let snapshot = rx.borrow_and_update().clone();
            if !snapshot.is_fetching {
                if let Some(err) = snapshot.error {
                    return Err(err);
                }
                return snapshot.typed::<T>(&key).data.ok_or_else(|| type_mismatch(&key));
            }
            if rx.changed().await.is_err() {
                return Err(Error::Cache(format!("{} was evicted while loading", key)));
            }
        }
    }

    /// Subscribes to `query`. Cached data is visible immediately; a missing,
    /// stale or invalidated entry is revalidated in the background.
    pub fn observe<T: Send + Sync + 'static>(&self, query: Query<T>) -> QueryObserver<T> {
        let key = query.key.clone();
        let mut entries = self.inner.entries();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.fetcher = Some(query.fetcher);
        entry.observers += 1;
        if !entry.is_fresh(self.inner.config.stale_after) && entry.in_flight.is_none() {
            self.inner.start_request(&key, entry);
        }
        QueryObserver {
            key,
            rx: entry.state.subscribe(),
            store: Arc::downgrade(&self.inner),
            _marker: PhantomData,
        }
    }

    /// Marks every entry under `prefix` stale. Entries with a mounted
    /// observer refetch right away, superseding any request in flight; the
    /// rest refetch on their next read. Returns how many entries matched.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.inner.entries();
        let mut matched = 0;
        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            matched += 1;
            entry.invalidated = true;
            entry.state.send_modify(|s| s.is_stale = true);
            if entry.observers > 0 {
                self.inner.start_request(key, entry);
            }
        }
        debug!("♻️ invalidated {} entries under {}", matched, prefix);
        matched
    }

    /// User-triggered retry of one key. Returns false when the key was never
    /// requested.
    pub fn refetch(&self, key: &QueryKey) -> bool {
        let mut entries = self.inner.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.fetcher.is_some() => {
                self.inner.start_request(key, entry);
                true
            }
            _ => false,
        }
    }

    /// Cached data for `key`, fresh or not.
    pub fn get<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        self.inner
            .entries()
            .get(key)
            .and_then(|entry| entry.state.borrow().typed::<T>(key).data)
    }

    pub fn status(&self, key: &QueryKey) -> Option<QueryStatus> {
        self.inner
            .entries()
            .get(key)
            .map(|entry| entry.state.borrow().status)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner
            .entries()
            .get(key)
            .map_or(false, |entry| entry.in_flight.is_some())
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.inner.entries().get(key).map_or(0, |entry| entry.observers)
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached result. Responses still in flight are discarded
    /// on arrival.
    ///
    /// Unmounted entries are evicted. Entries with a mounted observer stay
    /// subscribed but are reset to idle with no data, so the view never
    /// shows results from an earlier session; [`QueryStore::refetch_mounted`]
    /// loads them again.
    pub fn clear(&self) {
        let mut entries = self.inner.entries();
        debug!("🧹 clearing {} cached queries", entries.len());
        entries.retain(|_, entry| entry.observers > 0);
        for entry in entries.values_mut() {
            entry.in_flight = None;
            entry.fetched_at = None;
            entry.invalidated = true;
            entry.state.send_replace(Snapshot::idle());
        }
    }

    /// Starts a request for every entry a view is still mounted on. Returns
    /// how many were issued.
    pub fn refetch_mounted(&self) -> usize {
        let mut entries = self.inner.entries();
        let mut issued = 0;
        for (key, entry) in entries.iter_mut().filter(|(_, entry)| entry.observers > 0) {
            if entry.fetcher.is_some() {
                self.inner.start_request(key, entry);
                issued += 1;
            }
        }
        debug!("🔄 refetching {} mounted queries", issued);
        issued
    }
}

impl Default for QueryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl fmt::Debug for QueryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStore")
            .field("entries", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn type_mismatch(key: &QueryKey) -> Error {
    Error::Cache(format!("{} holds a different type than requested", key))
}

/// A mounted subscription to one key. Dropping it unmounts the view's
/// interest; requests already in flight still land in the cache.
pub struct QueryObserver<T> {
    key: QueryKey,
    rx: watch::Receiver<Snapshot>,
    store: Weak<StoreInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn current(&self) -> QueryResult<T> {
        self.rx.borrow().typed(&self.key)
    }

    /// Waits for the next change of this key's state.
    pub async fn changed(&mut self) -> Result<QueryResult<T>> {
        self.rx
            .changed()
            .await
            .map_err(|_| Error::Cache(format!("{} was evicted", self.key)))?;
        Ok(self.rx.borrow_and_update().typed(&self.key))
    }

    /// Waits until no request is in flight for this key.
    pub async fn settled(&mut self) -> Result<QueryResult<T>> {
        loop {
            let state = self.rx.borrow_and_update().typed::<T>(&self.key);
            if !state.is_fetching {
                return Ok(state);
            }
            self.rx
                .changed()
                .await
                .map_err(|_| Error::Cache(format!("{} was evicted", self.key)))?;
        }
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.release(&self.key);
        }
    }
}

impl<T> fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key.to_string())
            .finish()
    }
}
