//! Staged preload scheduler
//!
//! Runs a batch of items (a "stage") through a [`ContentLoader`] in priority
//! order, keeping at most `max_concurrent_loads` loads in flight, consulting
//! the shared cache before every dispatch and publishing per-stage progress.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use media_preload_cache::{CacheValue, MemoryAwareLruCache};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::error::{ErrorKind, MediaError, MediaResult};
use crate::priority::{DispatchQueue, PreloadableContent};
use crate::progress::{PreloadResult, PreloadStats, StageProgress};

/// Loads one item into a cacheable value
///
/// Implementations must observe `token` and leave no native listeners behind
/// on any outcome.
pub trait ContentLoader<V>: Send + Sync {
    fn load<'a>(
        &'a self,
        item: &'a PreloadableContent,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, MediaResult<V>>;
}

/// Configuration for the preload scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum loads in flight within one stage.
    /// Default: 4.
    pub max_concurrent_loads: usize,

    /// Wall-clock time after which a stalled stage counts as ready.
    /// Default: 15s.
    pub readiness_fallback: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_loads: 4,
            readiness_fallback: Duration::from_secs(15),
        }
    }
}

impl SchedulerConfig {
    /// Set the concurrency bound (at least 1)
    pub fn with_max_concurrent_loads(mut self, limit: usize) -> Self {
        self.max_concurrent_loads = limit.max(1);
        self
    }

    /// Set the readiness fallback threshold
    pub fn with_readiness_fallback(mut self, fallback: Duration) -> Self {
        self.readiness_fallback = fallback;
        self
    }
}

struct StageState {
    progress: watch::Sender<StageProgress>,
    started_at: Option<Instant>,
}

impl StageState {
    fn new() -> Self {
        Self {
            progress: watch::channel(StageProgress::default()).0,
            started_at: None,
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    stages: HashMap<String, StageState>,
    results: HashMap<String, PreloadResult>,
}

impl SchedulerState {
    fn stage_mut(&mut self, stage: &str) -> &mut StageState {
        self.stages
            .entry(stage.to_string())
            .or_insert_with(StageState::new)
    }
}

/// Priority preload scheduler
///
/// One instance per page context. Stages may run concurrently with each
/// other; each stage has its own concurrency bound, progress channel and
/// cancellation token.
///
/// # Example
///
/// ```
/// use futures::future::BoxFuture;
/// use media_preload_cache::{CacheValue, MemoryAwareLruCache};
/// use media_preload_scheduler::{
///     CancellationToken, ContentKind, ContentLoader, MediaResult, PreloadScheduler,
///     PreloadableContent, SchedulerConfig,
/// };
/// use std::sync::Arc;
///
/// #[derive(Clone)]
/// struct Loaded;
///
/// impl CacheValue for Loaded {
///     fn estimated_bytes(&self) -> usize {
///         1024
///     }
/// }
///
/// struct Immediate;
///
/// impl ContentLoader<Loaded> for Immediate {
///     fn load<'a>(
///         &'a self,
///         _item: &'a PreloadableContent,
///         _token: &'a CancellationToken,
///     ) -> BoxFuture<'a, MediaResult<Loaded>> {
///         Box::pin(async { Ok(Loaded) })
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let scheduler = PreloadScheduler::new(
///     Arc::new(Immediate),
///     MemoryAwareLruCache::new(50, 1 << 20),
///     SchedulerConfig::default(),
/// );
///
/// let items = vec![PreloadableContent::new("hero", ContentKind::Image, "https://cdn.test/hero.jpg")];
/// let results = scheduler.run_stage("critical", items).await;
///
/// assert!(results[0].success);
/// assert_eq!(scheduler.progress("critical").percentage, 100);
/// # });
/// ```
pub struct PreloadScheduler<V> {
    loader: Arc<dyn ContentLoader<V>>,
    cache: MemoryAwareLruCache<V>,
    config: SchedulerConfig,
    state: Arc<Mutex<SchedulerState>>,
    cancellation: CancellationRegistry,
}

impl<V: CacheValue> PreloadScheduler<V> {
    /// Create a scheduler dispatching to `loader` and caching into `cache`
    pub fn new(
        loader: Arc<dyn ContentLoader<V>>,
        cache: MemoryAwareLruCache<V>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            loader,
            cache,
            config,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            cancellation: CancellationRegistry::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one stage to completion
    ///
    /// Items are dispatched by ascending priority tier (input order within a
    /// tier). Every item yields exactly one result, whether it loaded, hit
    /// the cache, failed or was aborted; results are returned in completion
    /// order. When the future resolves the stage progress reads
    /// `completed == total`, unless a newer run of the same stage started
    /// meanwhile: that run owns the progress channel from its start, and the
    /// older run stops advancing it.
    pub async fn run_stage(&self, stage: &str, items: Vec<PreloadableContent>) -> Vec<PreloadResult> {
        let total = items.len();
        let mut queue = DispatchQueue::new(items);
        let token = self.cancellation.register(stage);

        {
            let mut state = self.lock();
            let entry = state.stage_mut(stage);
            entry.started_at = Some(Instant::now());
            entry.progress.send_replace(StageProgress::for_batch(total));
        }
        tracing::info!(stage, total, "preload stage started");

        let limit = self.config.max_concurrent_loads.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut results = Vec::with_capacity(total);

        loop {
            while in_flight.len() < limit {
                match queue.pop() {
                    Some(item) => in_flight.push(self.dispatch(item, token.clone())),
                    None => break,
                }
            }

            let Some(result) = in_flight.next().await else {
                break;
            };
            self.record(stage, &token, &result);
            results.push(result);
        }

        self.cancellation.unregister(stage, &token);

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(stage, total, failed, "preload stage finished");
        results
    }

    async fn dispatch(&self, item: PreloadableContent, token: CancellationToken) -> PreloadResult {
        if token.is_cancelled() {
            return PreloadResult::failed(item.id, ErrorKind::Aborted, 0);
        }

        if self.cache.get(&item.url).is_some() {
            tracing::debug!(id = %item.id, url = %item.url, "served from cache");
            return PreloadResult::cached(item.id);
        }

        tracing::debug!(id = %item.id, kind = ?item.kind, tier = item.priority_tier, "dispatching load");
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(MediaError::Aborted),
            outcome = self.loader.load(&item, &token) => outcome,
        };
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                self.cache.set(item.url.clone(), value);
                PreloadResult::loaded(item.id, elapsed)
            }
            Err(err) => {
                tracing::warn!(id = %item.id, url = %item.url, error = %err, "preload failed");
                PreloadResult::failed(item.id, err.kind(), elapsed)
            }
        }
    }

    fn record(&self, stage: &str, token: &CancellationToken, result: &PreloadResult) {
        let current = self.cancellation.is_current(stage, token);
        let mut state = self.lock();
        state.results.insert(result.id.clone(), result.clone());
        if current {
            state.stage_mut(stage).progress.send_modify(StageProgress::advance);
        } else {
            tracing::debug!(stage, id = %result.id, "result from a superseded run, progress untouched");
        }
    }

    /// Current progress of a stage
    ///
    /// A stage that was never submitted reads as vacuously complete.
    pub fn progress(&self, stage: &str) -> StageProgress {
        self.lock()
            .stages
            .get(stage)
            .map(|entry| *entry.progress.borrow())
            .unwrap_or_default()
    }

    /// Subscribe to progress updates of a stage
    pub fn subscribe(&self, stage: &str) -> watch::Receiver<StageProgress> {
        self.lock().stage_mut(stage).progress.subscribe()
    }

    /// Recorded result for an item id
    pub fn result(&self, id: &str) -> Option<PreloadResult> {
        self.lock().results.get(id).cloned()
    }

    /// All recorded results keyed by item id
    pub fn results(&self) -> HashMap<String, PreloadResult> {
        self.lock().results.clone()
    }

    /// Aggregate statistics over every recorded result
    pub fn stats(&self) -> PreloadStats {
        PreloadStats::from_results(self.lock().results.values())
    }

    /// Whether critical content of a stage may be considered ready
    ///
    /// True when `id` has a recorded success, when the stage has completed,
    /// or when the readiness fallback has elapsed since the stage started.
    /// A stage that has not started is not ready.
    pub fn is_critical_ready(&self, stage: &str, id: Option<&str>) -> bool {
        let state = self.lock();

        if let Some(id) = id {
            if state.results.get(id).is_some_and(|r| r.success) {
                return true;
            }
        }

        let Some(entry) = state.stages.get(stage) else {
            return false;
        };
        let Some(started_at) = entry.started_at else {
            return false;
        };

        entry.progress.borrow().is_complete()
            || started_at.elapsed() >= self.config.readiness_fallback
    }

    /// Abort a running stage
    ///
    /// In-flight loads are cancelled and queued items resolve as aborted
    /// without being dispatched. Returns `true` if the stage was running.
    pub fn abort_stage(&self, stage: &str) -> bool {
        let aborted = self.cancellation.cancel(stage);
        if aborted {
            tracing::info!(stage, "preload stage aborted");
        }
        aborted
    }

    /// Abort every running stage, returning how many were running
    pub fn abort_all(&self) -> usize {
        self.cancellation.cancel_all()
    }

    /// The cache consulted before every dispatch
    pub fn cache(&self) -> &MemoryAwareLruCache<V> {
        &self.cache
    }

    /// The scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}
