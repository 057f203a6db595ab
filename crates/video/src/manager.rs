//! Video resource manager
//!
//! Owns every live video handle from registration until cleanup. Keeps the
//! number of live handles under the environment's limit, removes the
//! listeners it attached, releases blob-backed sources and collapses
//! duplicate handles that point at the same media.
//!
//! Handle lifecycle: `Registered -> (Playing <-> Paused) -> CleanedUp`.
//! Cleanup removes a handle from the managed set before any of its steps
//! run, so a handle is never left registered, even when cleanup times out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use media_preload_loaders::{ElementHandle, ListenerId, MediaElement, MediaEvent, ReadyState};
use media_preload_scheduler::{MediaError, MediaResult};
use regex::Regex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use crate::arena::{Arena, VideoId};
use crate::blob::{is_blob_url, BlobTracker};
use crate::env::{Environment, EnvironmentLimits};

/// Host services the manager needs
pub trait VideoPlatform: Send + Sync {
    /// Origin of the embedding page, e.g. `https://invite.example`
    fn app_origin(&self) -> String;

    /// Release an object URL created for a blob
    fn revoke_object_url(&self, url: &str);
}

/// Lifecycle state of a managed video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoState {
    Registered,
    Playing,
    Paused,
    CleanedUp,
}

/// Configuration for the video manager
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoManagerConfig {
    pub environment: Environment,
    pub limits: EnvironmentLimits,
    /// Extra origins whose media may be registered
    pub trusted_origins: Vec<String>,
}

impl VideoManagerConfig {
    /// Limits matching `environment`, no extra trusted origins
    pub fn for_environment(environment: Environment) -> Self {
        Self {
            environment,
            limits: EnvironmentLimits::for_environment(environment),
            trusted_origins: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: EnvironmentLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_trusted_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_origins = origins.into_iter().map(Into::into).collect();
        self
    }
}

/// Presence score used to pick the handle to keep among duplicates
///
/// Attached 10, buffered 4, playing 2, visible 1.
pub fn presence_score(element: &dyn MediaElement) -> u32 {
    let mut score = 0;
    if element.is_connected() {
        score += 10;
    }
    if element.ready_state() >= ReadyState::HaveFutureData {
        score += 4;
    }
    if !element.is_paused() {
        score += 2;
    }
    if element.is_visible() {
        score += 1;
    }
    score
}

fn same_element(a: &ElementHandle, b: &ElementHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn origin_of(url: &Url) -> Option<String> {
    let origin = url.origin();
    origin
        .is_tuple()
        .then(|| origin.ascii_serialization())
}

struct ManagedVideo {
    element: ElementHandle,
    listeners: Vec<ListenerId>,
    blob_source: Option<String>,
    registered_at: Instant,
    order: u64,
    state: VideoState,
}

type PendingCleanup = Shared<BoxFuture<'static, MediaResult<()>>>;

#[derive(Default)]
struct ManagerState {
    videos: Arena<ManagedVideo>,
    cleanups: HashMap<VideoId, PendingCleanup>,
    blobs: BlobTracker,
    next_order: u64,
}

impl ManagerState {
    fn find(&self, element: &ElementHandle) -> Option<VideoId> {
        self.videos
            .iter()
            .find(|(_, video)| same_element(&video.element, element))
            .map(|(id, _)| id)
    }

    /// Live ids, oldest registration first
    fn ids_by_age(&self) -> Vec<VideoId> {
        let mut ids: Vec<(u64, VideoId)> = self
            .videos
            .iter()
            .map(|(id, video)| (video.order, id))
            .collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

struct Inner {
    platform: Arc<dyn VideoPlatform>,
    config: VideoManagerConfig,
    trusted_origins: Vec<String>,
    state: Mutex<ManagerState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, id: VideoId, new_state: VideoState) {
        if let Some(video) = self.state().videos.get_mut(id) {
            video.state = new_state;
        }
    }

    fn release_blob(&self, url: &str) {
        self.state().blobs.untrack(url);

        let delay = self.config.limits.blob_release_delay;
        if delay.is_zero() {
            self.platform.revoke_object_url(url);
            return;
        }

        let platform = self.platform.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            platform.revoke_object_url(&url);
        });
    }

    fn sweep_stale_blobs(&self) -> usize {
        let stale = self
            .state()
            .blobs
            .take_stale(self.config.limits.stale_blob_after);
        for url in &stale {
            self.platform.revoke_object_url(url);
        }
        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "swept stale blob urls");
        }
        stale.len()
    }

    /// Run the cleanup steps of one handle already taken out of the arena
    async fn release(self: Arc<Self>, id: VideoId, video: ManagedVideo) -> MediaResult<()> {
        let limits = &self.config.limits;

        let settle = async {
            for listener in &video.listeners {
                video.element.remove_listener(*listener);
            }
            if !video.element.is_paused() {
                video.element.pause();
                tokio::time::sleep(limits.settle_delay).await;
            }
        };
        let settled = tokio::time::timeout(limits.cleanup_timeout, settle).await;

        if let Some(url) = &video.blob_source {
            self.release_blob(url);
        }
        video.element.clear_source();
        self.state().cleanups.remove(&id);

        match settled {
            Ok(()) => {
                tracing::debug!(
                    ?id,
                    lived = ?video.registered_at.elapsed(),
                    "video cleaned up"
                );
                Ok(())
            }
            Err(_) => {
                tracing::warn!(?id, timeout = ?limits.cleanup_timeout, "video cleanup timed out, force released");
                Err(MediaError::CleanupTimeout(limits.cleanup_timeout))
            }
        }
    }
}

/// Tracks and releases live video handles
///
/// Cheap to clone; clones manage the same set of videos.
#[derive(Clone)]
pub struct VideoResourceManager {
    inner: Arc<Inner>,
}

impl VideoResourceManager {
    pub fn new(platform: Arc<dyn VideoPlatform>, config: VideoManagerConfig) -> Self {
        let trusted_origins = config
            .trusted_origins
            .iter()
            .filter_map(|origin| Url::parse(origin).ok())
            .filter_map(|url| origin_of(&url))
            .collect();

        tracing::info!(
            environment = ?config.environment,
            max_videos = config.limits.max_videos,
            "video manager created"
        );

        Self {
            inner: Arc::new(Inner {
                platform,
                config,
                trusted_origins,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state()
    }

    pub fn environment(&self) -> Environment {
        self.inner.config.environment
    }

    pub fn limits(&self) -> &EnvironmentLimits {
        &self.inner.config.limits
    }

    /// Check a video source against the origin policy
    ///
    /// Same-origin, trusted-origin, `blob:` and `data:video/` sources pass.
    /// Relative sources resolve against the app origin.
    pub fn validate_source(&self, source: &str) -> Result<(), String> {
        if is_blob_url(source) || source.to_ascii_lowercase().starts_with("data:video/") {
            return Ok(());
        }

        let app = Url::parse(&self.inner.platform.app_origin())
            .map_err(|err| format!("bad app origin: {err}"))?;
        let resolved = app
            .join(source)
            .map_err(|err| format!("{source}: {err}"))?;

        let origin = origin_of(&resolved).ok_or_else(|| format!("{source} has an opaque origin"))?;
        if origin_of(&app).as_deref() == Some(origin.as_str())
            || self.inner.trusted_origins.contains(&origin)
        {
            Ok(())
        } else {
            Err(format!("untrusted origin {origin}"))
        }
    }

    /// Register a video handle
    ///
    /// Returns `None`, with a warning, when the element is detached or its
    /// source fails the origin policy. Attaching is the host's job: elements
    /// handed out by the media platform arrive already connected. Registering an element twice returns
    /// its existing id. At the limit the oldest registrations are cleaned up
    /// first.
    pub async fn register_video(&self, element: ElementHandle) -> Option<VideoId> {
        if !element.is_connected() {
            tracing::warn!("refusing to register a detached video");
            return None;
        }

        let source = element.source();
        if let Some(source) = &source {
            if let Err(reason) = self.validate_source(source) {
                tracing::warn!(%reason, "refusing to register video");
                return None;
            }
        }

        let limits = self.limits().clone();
        let id = loop {
            let victims = {
                let mut state = self.lock();
                if let Some(existing) = state.find(&element) {
                    return Some(existing);
                }

                if state.videos.len() < limits.max_videos.max(1) {
                    let order = state.next_order;
                    state.next_order += 1;

                    let blob_source = source.clone().filter(|src| is_blob_url(src));
                    if let Some(url) = &blob_source {
                        state.blobs.track(url);
                    }

                    let initial = if element.is_paused() {
                        VideoState::Registered
                    } else {
                        VideoState::Playing
                    };
                    break state.videos.insert(ManagedVideo {
                        element: element.clone(),
                        listeners: Vec::new(),
                        blob_source,
                        registered_at: Instant::now(),
                        order,
                        state: initial,
                    });
                }

                let mut oldest = state.ids_by_age();
                oldest.truncate(limits.eviction_batch.max(1));
                oldest
            };

            tracing::info!(count = victims.len(), "video limit reached, evicting oldest");
            for outcome in join_all(victims.into_iter().map(|id| self.cleanup_video(id))).await {
                if let Err(err) = outcome {
                    tracing::warn!(error = %err, "eviction cleanup failed");
                }
            }
        };

        let listeners: Vec<ListenerId> = [MediaEvent::Play, MediaEvent::Pause]
            .into_iter()
            .map(|event| {
                let inner = Arc::downgrade(&self.inner);
                element.add_listener(
                    event,
                    Arc::new(move |fired: MediaEvent| {
                        let new_state = if fired == MediaEvent::Play {
                            VideoState::Playing
                        } else {
                            VideoState::Paused
                        };
                        if let Some(inner) = inner.upgrade() {
                            inner.set_state(id, new_state);
                        }
                    }),
                )
            })
            .collect();

        let orphaned = {
            let mut state = self.lock();
            match state.videos.get_mut(id) {
                Some(video) => {
                    video.listeners = listeners;
                    None
                }
                None => Some(listeners),
            }
        };
        // Cleaned up before the listeners were recorded
        if let Some(listeners) = orphaned {
            for listener in listeners {
                element.remove_listener(listener);
            }
        }

        tracing::debug!(?id, source = ?source, "video registered");
        Some(id)
    }

    /// Release one video
    ///
    /// Idempotent: unknown or already cleaned ids resolve `Ok`, and
    /// concurrent calls for the same id join one cleanup. A cleanup that
    /// outlives the environment's deadline still releases the source and
    /// reports `CleanupTimeout`.
    pub async fn cleanup_video(&self, id: VideoId) -> MediaResult<()> {
        let pending = {
            let mut state = self.lock();
            if let Some(pending) = state.cleanups.get(&id) {
                pending.clone()
            } else if let Some(video) = state.videos.remove(id) {
                let task = tokio::spawn(self.inner.clone().release(id, video));
                let pending = async move {
                    task.await.unwrap_or_else(|err| {
                        Err(MediaError::CacheEvictionInternal(format!(
                            "cleanup task failed: {err}"
                        )))
                    })
                }
                .boxed()
                .shared();
                state.cleanups.insert(id, pending.clone());
                pending
            } else {
                return Ok(());
            }
        };

        pending.await
    }

    /// Keep only the best handle among videos whose source matches `pattern`
    ///
    /// Returns the number of handles removed. The survivor has the highest
    /// [`presence_score`]; ties go to the earliest registration. Losers are
    /// paused, cleaned up and detached.
    pub async fn deduplicate_videos(&self, pattern: &Regex) -> usize {
        let candidates: Vec<(VideoId, u64, ElementHandle)> = self
            .lock()
            .videos
            .iter()
            .map(|(id, video)| (id, video.order, video.element.clone()))
            .collect();

        let mut scored: Vec<(u32, u64, VideoId, ElementHandle)> = candidates
            .into_iter()
            .filter(|(_, _, element)| {
                element
                    .source()
                    .is_some_and(|source| pattern.is_match(&source))
            })
            .map(|(id, order, element)| (presence_score(&*element), order, id, element))
            .collect();

        if scored.len() < 2 {
            return 0;
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let losers = scored.split_off(1);
        tracing::info!(
            kept = ?scored[0].2,
            score = scored[0].0,
            removed = losers.len(),
            "deduplicating videos"
        );

        let removals = losers.iter().map(|(_, _, id, element)| async move {
            element.pause();
            let outcome = self.cleanup_video(*id).await;
            element.detach();
            outcome
        });
        for outcome in join_all(removals).await {
            if let Err(err) = outcome {
                tracing::warn!(error = %err, "duplicate video cleanup failed");
            }
        }

        losers.len()
    }

    /// Release every video and clear all tracking
    ///
    /// Waits for in-flight cleanups, then cleans the remaining handles
    /// oldest first, in batches with a pause in between where the
    /// environment asks for it. Returns the number of handles cleaned.
    pub async fn cleanup_all_videos(&self) -> usize {
        let pending: Vec<PendingCleanup> = self.lock().cleanups.values().cloned().collect();
        join_all(pending).await;

        let ids = self.lock().ids_by_age();
        let limits = self.limits().clone();
        let batch_size = limits.cleanup_batch_size.unwrap_or(ids.len()).max(1);

        for (index, batch) in ids.chunks(batch_size).enumerate() {
            if index > 0 && !limits.batch_pause.is_zero() {
                tokio::time::sleep(limits.batch_pause).await;
            }
            for outcome in join_all(batch.iter().map(|id| self.cleanup_video(*id))).await {
                if let Err(err) = outcome {
                    tracing::warn!(error = %err, "video cleanup failed");
                }
            }
        }

        let (leftover, blobs) = {
            let mut state = self.lock();
            (state.videos.drain(), state.blobs.take_all())
        };
        for video in &leftover {
            for listener in &video.listeners {
                video.element.remove_listener(*listener);
            }
            video.element.clear_source();
        }
        for url in &blobs {
            self.inner.platform.revoke_object_url(url);
        }

        let cleaned = ids.len() + leftover.len();
        tracing::info!(cleaned, revoked_blobs = blobs.len(), "all videos cleaned up");
        cleaned
    }

    /// Record a blob URL created for a video or audio resource
    pub fn track_blob(&self, url: &str) -> bool {
        self.lock().blobs.track(url)
    }

    /// Stop tracking a blob URL without revoking it
    pub fn untrack_blob(&self, url: &str) -> bool {
        self.lock().blobs.untrack(url)
    }

    pub fn tracked_blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    /// Revoke tracked blob URLs older than the staleness threshold
    pub fn sweep_stale_blobs(&self) -> usize {
        self.inner.sweep_stale_blobs()
    }

    /// Sweep stale blobs every `period` until the manager is dropped
    pub fn spawn_blob_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.sweep_stale_blobs();
            }
        })
    }

    pub fn is_registered(&self, id: VideoId) -> bool {
        self.lock().videos.get(id).is_some()
    }

    /// Lifecycle state of `id`, `None` if this manager never issued it
    pub fn video_state(&self, id: VideoId) -> Option<VideoState> {
        let state = self.lock();
        match state.videos.get(id) {
            Some(video) => Some(video.state),
            None if state.videos.was_removed(id) => Some(VideoState::CleanedUp),
            None => None,
        }
    }

    /// Number of live handles
    pub fn live_count(&self) -> usize {
        self.lock().videos.len()
    }

    /// Whether a cleanup is still running for `id`
    pub fn is_cleaning_up(&self, id: VideoId) -> bool {
        self.lock().cleanups.contains_key(&id)
    }
}
