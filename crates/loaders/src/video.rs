//! Two-phase video loader
//!
//! The element starts with a `metadata` preload hint. Once metadata arrives
//! the hint is upgraded to `auto` and a shorter progressive timer is armed:
//! the load resolves as playable on `CanPlay`/`CanPlayThrough`, or with
//! metadata-only readiness if the progressive timer fires first. The load
//! only fails on timeout if metadata never arrived.

use std::sync::Arc;
use std::time::Duration;

use media_preload_scheduler::{CancellationToken, MediaError, MediaResult};
use tokio::time::Instant;

use crate::listener::{native_error, ListenerGuard};
use crate::platform::{ElementHandle, ElementKind, MediaEvent, MediaPlatform, PreloadHint};

/// How far a video got before its load resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoReadiness {
    /// The element can start playing
    Playable,
    /// Dimensions and duration are known, playback data is not buffered yet
    MetadataOnly,
}

/// A loaded video element
#[derive(Clone)]
pub struct LoadedVideo {
    pub element: ElementHandle,
    pub readiness: VideoReadiness,
}

impl std::fmt::Debug for LoadedVideo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedVideo")
            .field("source", &self.element.source())
            .field("readiness", &self.readiness)
            .finish()
    }
}

/// Loads video through a native element
pub struct VideoLoader {
    platform: Arc<dyn MediaPlatform>,
    timeout: Duration,
    progressive_timeout: Duration,
}

impl VideoLoader {
    /// Default wait for playability after metadata arrived
    pub const DEFAULT_PROGRESSIVE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(platform: Arc<dyn MediaPlatform>, timeout: Duration) -> Self {
        Self {
            platform,
            timeout,
            progressive_timeout: Self::DEFAULT_PROGRESSIVE_TIMEOUT,
        }
    }

    /// Set the progressive timer armed when metadata arrives
    pub fn with_progressive_timeout(mut self, progressive_timeout: Duration) -> Self {
        self.progressive_timeout = progressive_timeout;
        self
    }

    /// Load `url`
    pub async fn load(&self, url: &str, token: &CancellationToken) -> MediaResult<LoadedVideo> {
        let element = self.platform.create_element(ElementKind::Video);
        let (guard, mut events) = ListenerGuard::channel(
            &element,
            &[
                MediaEvent::LoadedMetadata,
                MediaEvent::CanPlay,
                MediaEvent::CanPlayThrough,
                MediaEvent::Error,
            ],
        );

        element.set_preload(PreloadHint::Metadata);
        element.set_source(url);

        let deadline = tokio::time::sleep(self.timeout);
        let progressive = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline, progressive);
        let mut metadata_seen = false;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break Err(MediaError::Aborted),
                event = events.recv() => match event {
                    Some(MediaEvent::LoadedMetadata) if !metadata_seen => {
                        metadata_seen = true;
                        element.set_preload(PreloadHint::Auto);
                        progressive
                            .as_mut()
                            .reset(Instant::now() + self.progressive_timeout);
                    }
                    Some(MediaEvent::CanPlay | MediaEvent::CanPlayThrough) => {
                        break Ok(VideoReadiness::Playable)
                    }
                    Some(MediaEvent::Error) if metadata_seen => {
                        tracing::warn!(
                            url,
                            error = ?element.error_message(),
                            "video errored after metadata, keeping metadata"
                        );
                        break Ok(VideoReadiness::MetadataOnly);
                    }
                    Some(MediaEvent::Error) => break Err(native_error(&element)),
                    Some(_) => {}
                    None => {
                        break Err(MediaError::NetworkOrDecode(
                            "element dropped its listeners".to_string(),
                        ))
                    }
                },
                _ = &mut progressive, if metadata_seen => {
                    tracing::debug!(url, "video not playable in time, keeping metadata");
                    break Ok(VideoReadiness::MetadataOnly);
                }
                _ = &mut deadline => {
                    break if metadata_seen {
                        Ok(VideoReadiness::MetadataOnly)
                    } else {
                        Err(MediaError::Timeout(self.timeout))
                    };
                }
            }
        };
        drop(guard);

        match outcome {
            Ok(readiness) => Ok(LoadedVideo { element, readiness }),
            Err(err) => {
                element.clear_source();
                Err(err)
            }
        }
    }
}
