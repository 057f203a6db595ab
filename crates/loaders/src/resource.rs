//! Loaded resources and per-kind dispatch
//!
//! [`LoaderSet`] bundles one loader per content kind and plugs into the
//! scheduler as its [`ContentLoader`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use media_preload_cache::{estimate_bytes, CacheValue, SizeHint};
use media_preload_scheduler::{
    CancellationToken, ContentKind, ContentLoader, MediaResult, PreloadableContent,
};

use crate::audio::AudioLoader;
use crate::font::{FontConfig, FontLoader, LoadedFont};
use crate::image::ImageLoader;
use crate::platform::{ElementHandle, MediaPlatform};
use crate::vector::{MarkupSanitizer, VectorLoader};
use crate::video::{LoadedVideo, VideoLoader};

/// Metadata key holding a font's family name
pub const FONT_FAMILY_KEY: &str = "family";

/// A successfully preloaded resource, as stored in the cache
#[derive(Clone)]
pub enum LoadedResource {
    Image {
        element: ElementHandle,
        width: u32,
        height: u32,
    },
    Video(LoadedVideo),
    Audio(ElementHandle),
    Font(LoadedFont),
    /// Sanitized SVG markup
    Vector(Arc<str>),
}

impl LoadedResource {
    pub fn kind(&self) -> ContentKind {
        match self {
            LoadedResource::Image { .. } => ContentKind::Image,
            LoadedResource::Video(_) => ContentKind::Video,
            LoadedResource::Audio(_) => ContentKind::Audio,
            LoadedResource::Font(_) => ContentKind::Font,
            LoadedResource::Vector(_) => ContentKind::Vector,
        }
    }

    /// The native element backing this resource, if any
    pub fn element(&self) -> Option<&ElementHandle> {
        match self {
            LoadedResource::Image { element, .. } | LoadedResource::Audio(element) => {
                Some(element)
            }
            LoadedResource::Video(video) => Some(&video.element),
            LoadedResource::Font(_) | LoadedResource::Vector(_) => None,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            LoadedResource::Image { width, height, .. } => SizeHint::Image {
                width: *width,
                height: *height,
            },
            LoadedResource::Video(_) => SizeHint::Video,
            LoadedResource::Audio(_) => SizeHint::Audio,
            LoadedResource::Font(_) => SizeHint::Font,
            LoadedResource::Vector(markup) => SizeHint::Serialized(markup.len()),
        }
    }
}

impl std::fmt::Debug for LoadedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadedResource::Image { width, height, .. } => f
                .debug_struct("Image")
                .field("width", width)
                .field("height", height)
                .finish(),
            LoadedResource::Video(video) => video.fmt(f),
            LoadedResource::Audio(element) => {
                f.debug_tuple("Audio").field(&element.source()).finish()
            }
            LoadedResource::Font(font) => font.fmt(f),
            LoadedResource::Vector(markup) => {
                f.debug_tuple("Vector").field(&markup.len()).finish()
            }
        }
    }
}

impl CacheValue for LoadedResource {
    fn estimated_bytes(&self) -> usize {
        estimate_bytes(self.size_hint())
    }

    /// Images and audio drop their source. Videos belong to the video
    /// manager and font faces to the [`FontLoader`], so neither is touched.
    fn release(&self) {
        match self {
            LoadedResource::Image { element, .. } | LoadedResource::Audio(element) => {
                element.clear_source()
            }
            LoadedResource::Video(_) | LoadedResource::Font(_) | LoadedResource::Vector(_) => {}
        }
    }

    /// Element-backed resources need their source, fonts a live face
    fn is_usable(&self) -> bool {
        match self {
            LoadedResource::Font(font) => !font.handle.is_released(),
            LoadedResource::Vector(_) => true,
            _ => self
                .element()
                .is_some_and(|element| element.source().is_some()),
        }
    }
}

/// Per-kind load deadlines
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderTimeouts {
    /// Default: 15s.
    pub image: Duration,
    /// Default: 15s.
    pub video: Duration,
    /// Wait for playability once metadata is known.
    /// Default: 5s.
    pub video_progressive: Duration,
    /// Default: 15s.
    pub audio: Duration,
    /// Default: 15s.
    pub vector: Duration,
}

impl Default for LoaderTimeouts {
    fn default() -> Self {
        Self {
            image: Duration::from_secs(15),
            video: Duration::from_secs(15),
            video_progressive: VideoLoader::DEFAULT_PROGRESSIVE_TIMEOUT,
            audio: Duration::from_secs(15),
            vector: Duration::from_secs(15),
        }
    }
}

impl LoaderTimeouts {
    /// The same deadline for every kind, keeping the progressive default
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            image: timeout,
            video: timeout,
            audio: timeout,
            vector: timeout,
            ..Self::default()
        }
    }
}

/// One loader per content kind
pub struct LoaderSet {
    image: ImageLoader,
    video: VideoLoader,
    audio: AudioLoader,
    vector: VectorLoader,
    font: FontLoader,
}

impl LoaderSet {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        sanitizer: Arc<dyn MarkupSanitizer>,
        timeouts: LoaderTimeouts,
        font_config: FontConfig,
    ) -> Self {
        Self {
            image: ImageLoader::new(platform.clone(), timeouts.image),
            video: VideoLoader::new(platform.clone(), timeouts.video)
                .with_progressive_timeout(timeouts.video_progressive),
            audio: AudioLoader::new(platform.clone(), timeouts.audio),
            vector: VectorLoader::new(platform.clone(), sanitizer, timeouts.vector),
            font: FontLoader::new(platform, font_config),
        }
    }

    pub fn font_loader(&self) -> &FontLoader {
        &self.font
    }

    /// Load one item with the loader for its kind
    pub async fn load_item(
        &self,
        item: &PreloadableContent,
        token: &CancellationToken,
    ) -> MediaResult<LoadedResource> {
        match item.kind {
            ContentKind::Image => {
                let element = self.image.load(&item.url, token).await?;
                let (width, height) = element.natural_size();
                Ok(LoadedResource::Image {
                    element,
                    width,
                    height,
                })
            }
            ContentKind::Video => Ok(LoadedResource::Video(
                self.video.load(&item.url, token).await?,
            )),
            ContentKind::Audio => Ok(LoadedResource::Audio(
                self.audio.load(&item.url, token).await?,
            )),
            ContentKind::Vector => Ok(LoadedResource::Vector(
                self.vector.load(&item.url, token).await?.into(),
            )),
            ContentKind::Font => {
                let family = item.metadata_str(FONT_FAMILY_KEY).unwrap_or(item.id.as_str());
                Ok(LoadedResource::Font(
                    self.font.load(&item.url, family, token).await?,
                ))
            }
        }
    }
}

impl ContentLoader<LoadedResource> for LoaderSet {
    fn load<'a>(
        &'a self,
        item: &'a PreloadableContent,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, MediaResult<LoadedResource>> {
        self.load_item(item, token).boxed()
    }
}
