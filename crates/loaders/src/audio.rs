//! Audio loader

use std::sync::Arc;
use std::time::Duration;

use media_preload_scheduler::{CancellationToken, MediaResult};

use crate::listener::{await_signal, native_error, ListenerGuard};
use crate::platform::{ElementHandle, ElementKind, MediaEvent, MediaPlatform, PreloadHint};

/// Buffers audio metadata through a native element
pub struct AudioLoader {
    platform: Arc<dyn MediaPlatform>,
    timeout: Duration,
}

impl AudioLoader {
    pub fn new(platform: Arc<dyn MediaPlatform>, timeout: Duration) -> Self {
        Self { platform, timeout }
    }

    /// Load `url`, resolving once metadata is available
    pub async fn load(&self, url: &str, token: &CancellationToken) -> MediaResult<ElementHandle> {
        let element = self.platform.create_element(ElementKind::Audio);
        let (guard, mut events) =
            ListenerGuard::channel(&element, &[MediaEvent::LoadedMetadata, MediaEvent::Error]);

        element.set_preload(PreloadHint::Metadata);
        element.set_source(url);
        let outcome = await_signal(&mut events, token, self.timeout, |event| match event {
            MediaEvent::LoadedMetadata => Some(Ok(())),
            MediaEvent::Error => Some(Err(native_error(&element))),
            _ => None,
        })
        .await;
        drop(guard);

        match outcome {
            Ok(()) => Ok(element),
            Err(err) => {
                element.clear_source();
                Err(err)
            }
        }
    }
}
