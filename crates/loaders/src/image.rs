//! Image loader

use std::sync::Arc;
use std::time::Duration;

use media_preload_scheduler::{CancellationToken, MediaResult};

use crate::listener::{await_signal, native_error, ListenerGuard};
use crate::platform::{ElementHandle, ElementKind, MediaEvent, MediaPlatform};

/// Decodes an image through a native element
pub struct ImageLoader {
    platform: Arc<dyn MediaPlatform>,
    timeout: Duration,
}

impl ImageLoader {
    pub fn new(platform: Arc<dyn MediaPlatform>, timeout: Duration) -> Self {
        Self { platform, timeout }
    }

    /// Load `url`, resolving once the element reports `Load`
    ///
    /// On any failure the element's source is cleared before returning.
    pub async fn load(&self, url: &str, token: &CancellationToken) -> MediaResult<ElementHandle> {
        let element = self.platform.create_element(ElementKind::Image);
        let (guard, mut events) =
            ListenerGuard::channel(&element, &[MediaEvent::Load, MediaEvent::Error]);

        element.set_source(url);
        let outcome = await_signal(&mut events, token, self.timeout, |event| match event {
            MediaEvent::Load => Some(Ok(())),
            MediaEvent::Error => Some(Err(native_error(&element))),
            _ => None,
        })
        .await;
        drop(guard);

        match outcome {
            Ok(()) => {
                tracing::debug!(url, size = ?element.natural_size(), "image decoded");
                Ok(element)
            }
            Err(err) => {
                element.clear_source();
                Err(err)
            }
        }
    }
}
