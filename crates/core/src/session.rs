//! Preload session
//!
//! One [`PreloadSession`] per page context owns the resource cache, the
//! loaders, the scheduler and the video manager, and wires them together.
//! Item URLs are normalized before dispatch and every successfully loaded
//! video is handed to the video manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use media_preload_cache::CacheStats;
use media_preload_loaders::{
    FontLoader, LoadedResource, LoaderSet, MarkupSanitizer, MediaElement, MediaPlatform,
};
use media_preload_scheduler::{
    CancellationToken, ContentLoader, MediaResult, PreloadResult, PreloadScheduler,
    PreloadStats, PreloadableContent, StageProgress,
};
use media_preload_video::{
    is_blob_url, CapabilityProbe, Environment, VideoPlatform, VideoResourceManager,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::PreloadConfig;

/// Turns raw item URLs into absolute ones
pub trait UrlResolver: Send + Sync {
    fn to_absolute_url(&self, raw: &str) -> String;
}

/// Resolves relative URLs against a fixed base
///
/// `data:` and `blob:` URLs pass through untouched, as does anything that
/// fails to resolve.
#[derive(Debug, Clone)]
pub struct BaseUrlResolver {
    base: Url,
}

impl BaseUrlResolver {
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base: Url::parse(base)?,
        })
    }
}

impl UrlResolver for BaseUrlResolver {
    fn to_absolute_url(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.starts_with("data:") || is_blob_url(raw) {
            return raw.to_string();
        }
        self.base
            .join(raw)
            .map(String::from)
            .unwrap_or_else(|_| raw.to_string())
    }
}

/// Host services a session runs against
#[derive(Clone)]
pub struct SessionCollaborators {
    pub media: Arc<dyn MediaPlatform>,
    pub video: Arc<dyn VideoPlatform>,
    pub sanitizer: Arc<dyn MarkupSanitizer>,
    pub resolver: Arc<dyn UrlResolver>,
    pub probe: Arc<dyn CapabilityProbe>,
}

/// Loader that registers what it loads with the video manager
struct RegisteringLoader {
    loaders: LoaderSet,
    videos: VideoResourceManager,
}

impl RegisteringLoader {
    async fn load_and_register(
        &self,
        item: &PreloadableContent,
        token: &CancellationToken,
    ) -> MediaResult<LoadedResource> {
        let resource = self.loaders.load_item(item, token).await?;

        match &resource {
            LoadedResource::Video(video) => {
                if self.videos.register_video(video.element.clone()).await.is_none() {
                    tracing::warn!(id = %item.id, url = %item.url, "loaded video left unmanaged");
                }
            }
            LoadedResource::Audio(element) => {
                if let Some(source) = element.source().filter(|src| is_blob_url(src)) {
                    self.videos.track_blob(&source);
                }
            }
            _ => {}
        }

        Ok(resource)
    }
}

impl ContentLoader<LoadedResource> for RegisteringLoader {
    fn load<'a>(
        &'a self,
        item: &'a PreloadableContent,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, MediaResult<LoadedResource>> {
        self.load_and_register(item, token).boxed()
    }
}

/// A preload session for one page context
pub struct PreloadSession {
    config: PreloadConfig,
    environment: Environment,
    resolver: Arc<dyn UrlResolver>,
    scheduler: PreloadScheduler<LoadedResource>,
    videos: VideoResourceManager,
    fonts: FontLoader,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl PreloadSession {
    pub fn new(config: PreloadConfig, collaborators: SessionCollaborators) -> Self {
        let environment = Environment::detect(collaborators.probe.as_ref());

        let videos = VideoResourceManager::new(
            collaborators.video,
            config.video_config(environment),
        );
        let loaders = LoaderSet::new(
            collaborators.media,
            collaborators.sanitizer,
            config.loader_timeouts(),
            config.font_config(),
        );
        let fonts = loaders.font_loader().clone();
        let scheduler = PreloadScheduler::new(
            Arc::new(RegisteringLoader {
                loaders,
                videos: videos.clone(),
            }),
            config.build_cache(),
            config.scheduler_config(),
        );

        tracing::info!(
            ?environment,
            cache_items = config.cache_max_items,
            cache_mb = config.cache_mb(),
            max_concurrent = config.max_concurrent_loads,
            "preload session created"
        );

        Self {
            config,
            environment,
            resolver: collaborators.resolver,
            scheduler,
            videos,
            fonts,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PreloadConfig {
        &self.config
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn videos(&self) -> &VideoResourceManager {
        &self.videos
    }

    pub fn fonts(&self) -> &FontLoader {
        &self.fonts
    }

    pub fn scheduler(&self) -> &PreloadScheduler<LoadedResource> {
        &self.scheduler
    }

    fn normalize(&self, mut item: PreloadableContent) -> PreloadableContent {
        item.url = self.resolver.to_absolute_url(&item.url);
        item
    }

    /// Normalize every item's URL, then run the stage to completion
    pub async fn run_stage(&self, stage: &str, items: Vec<PreloadableContent>) -> Vec<PreloadResult> {
        let items = items.into_iter().map(|item| self.normalize(item)).collect();
        self.scheduler.run_stage(stage, items).await
    }

    pub fn progress(&self, stage: &str) -> StageProgress {
        self.scheduler.progress(stage)
    }

    pub fn subscribe(&self, stage: &str) -> watch::Receiver<StageProgress> {
        self.scheduler.subscribe(stage)
    }

    pub fn result(&self, id: &str) -> Option<PreloadResult> {
        self.scheduler.result(id)
    }

    pub fn results(&self) -> HashMap<String, PreloadResult> {
        self.scheduler.results()
    }

    pub fn stats(&self) -> PreloadStats {
        self.scheduler.stats()
    }

    /// See [`PreloadScheduler::is_critical_ready`]
    pub fn is_critical_ready(&self, stage: &str, id: Option<&str>) -> bool {
        self.scheduler.is_critical_ready(stage, id)
    }

    pub fn abort_stage(&self, stage: &str) -> bool {
        self.scheduler.abort_stage(stage)
    }

    /// A cached resource by its raw or absolute URL
    pub fn resource(&self, url: &str) -> Option<LoadedResource> {
        self.scheduler
            .cache()
            .get(&self.resolver.to_absolute_url(url))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.scheduler.cache().stats()
    }

    /// Whether the cache is under enough memory pressure that low-priority
    /// stages should wait
    pub fn should_defer_preloads(&self) -> bool {
        self.cache_stats().pressure().should_defer_preloads()
    }

    /// Sweep stale blob URLs every `period` until teardown
    pub fn start_blob_sweeper(&self, period: Duration) {
        let handle = self.videos.spawn_blob_sweeper(period);
        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Abort every stage, release every video and empty all caches
    ///
    /// Returns the number of videos cleaned up.
    pub async fn teardown(&self) -> usize {
        let aborted = self.scheduler.abort_all();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let cleaned = self.videos.cleanup_all_videos().await;
        self.fonts.clear();
        self.scheduler.cache().clear();

        tracing::info!(aborted, cleaned, "preload session torn down");
        cleaned
    }
}
