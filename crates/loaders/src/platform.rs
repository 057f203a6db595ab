//! Native media platform abstraction
//!
//! Loaders never talk to a concrete runtime. They create elements, attach
//! listeners and register font faces through these traits, so the same
//! loading logic runs against a browser binding or a scripted fake.

use std::sync::Arc;

use futures::future::BoxFuture;
use media_preload_scheduler::MediaResult;

/// Signals emitted by native media elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaEvent {
    /// Image fully decoded
    Load,
    LoadedMetadata,
    LoadedData,
    CanPlay,
    CanPlayThrough,
    Error,
    Play,
    Pause,
    Ended,
}

/// Handle returned when a listener is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked for every matching event
pub type ListenerCallback = Arc<dyn Fn(MediaEvent) + Send + Sync>;

/// Kind of native element to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Image,
    Video,
    Audio,
}

/// How much of a media resource the element should fetch ahead of playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreloadHint {
    #[default]
    None,
    Metadata,
    Auto,
}

/// How much media data an element has buffered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// A native image, video or audio element
pub trait MediaElement: Send + Sync {
    fn kind(&self) -> ElementKind;

    /// Attach a listener for `event`
    fn add_listener(&self, event: MediaEvent, callback: ListenerCallback) -> ListenerId;

    /// Detach a listener, returning `false` if it was not attached
    fn remove_listener(&self, id: ListenerId) -> bool;

    fn set_preload(&self, hint: PreloadHint);

    /// Point the element at `url`, starting the native load
    fn set_source(&self, url: &str);

    fn source(&self) -> Option<String>;

    /// Drop the source so the native side can release decoded data
    fn clear_source(&self);

    /// Intrinsic pixel size, `(0, 0)` until known
    fn natural_size(&self) -> (u32, u32);

    fn ready_state(&self) -> ReadyState;

    fn is_paused(&self) -> bool;

    fn pause(&self);

    /// Whether the element is attached to the document
    fn is_connected(&self) -> bool;

    /// Whether the element currently intersects the viewport
    fn is_visible(&self) -> bool;

    /// Remove the element from the document
    fn detach(&self);

    /// Native error description after an `Error` event
    fn error_message(&self) -> Option<String>;
}

impl std::fmt::Debug for dyn MediaElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaElement")
            .field("kind", &self.kind())
            .field("source", &self.source())
            .finish()
    }
}

/// Shared handle to a native element
pub type ElementHandle = Arc<dyn MediaElement>;

/// A font face registered with the platform
pub trait NativeFontFace: Send + Sync {
    fn family(&self) -> &str;

    /// Unregister the face from the document
    fn release(&self);

    /// Whether `release` already ran
    fn is_released(&self) -> bool;
}

/// Shared handle to a registered font face
pub type FontHandle = Arc<dyn NativeFontFace>;

/// Font display strategy while a face is loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontDisplay {
    Auto,
    Block,
    #[default]
    Swap,
    Fallback,
    Optional,
}

impl FontDisplay {
    /// CSS keyword for this strategy
    pub fn as_str(self) -> &'static str {
        match self {
            FontDisplay::Auto => "auto",
            FontDisplay::Block => "block",
            FontDisplay::Swap => "swap",
            FontDisplay::Fallback => "fallback",
            FontDisplay::Optional => "optional",
        }
    }
}

/// Entry points into the native runtime
///
/// Futures returned here are `'static` so loaders can race them against
/// timeouts and cancellation without borrowing the platform.
pub trait MediaPlatform: Send + Sync {
    /// Create a media element for preloading
    ///
    /// The host attaches the element to the document (hidden, outside the
    /// layout) before returning it. The video manager only tracks connected
    /// elements, so a detached preload stays unmanaged.
    fn create_element(&self, kind: ElementKind) -> ElementHandle;

    /// Fetch a remote document as text
    fn fetch_text(&self, url: &str) -> BoxFuture<'static, MediaResult<String>>;

    /// Try to render vector markup offscreen, resolving `true` if it drew
    fn render_probe(&self, markup: &str) -> BoxFuture<'static, bool>;

    /// Fetch and register a font face under `family`
    fn load_font_face(
        &self,
        family: &str,
        url: &str,
        display: FontDisplay,
    ) -> BoxFuture<'static, MediaResult<FontHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_ordering() {
        assert!(ReadyState::HaveEnoughData > ReadyState::HaveFutureData);
        assert!(ReadyState::HaveFutureData > ReadyState::HaveMetadata);
        assert_eq!(ReadyState::default(), ReadyState::HaveNothing);
    }

    #[test]
    fn test_font_display_keyword() {
        assert_eq!(FontDisplay::default().as_str(), "swap");
        assert_eq!(FontDisplay::Optional.as_str(), "optional");
    }
}
