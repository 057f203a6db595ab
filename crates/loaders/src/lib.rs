//! Media Preload Loaders Library
//!
//! One loader per media kind, each wrapping a native asynchronous load with
//! a deadline and cooperative cancellation.
//!
//! Loaders talk to the runtime through [`MediaPlatform`] and attach every
//! native listener through a [`ListenerGuard`], so no listener outlives the
//! load that attached it. [`LoaderSet`] dispatches by content kind and is the
//! [`ContentLoader`](media_preload_scheduler::ContentLoader) the scheduler
//! drives.
//!
//! # Example
//!
//! ```
//! use media_preload_loaders::font::{sanitize_font_name, validate_font_url};
//!
//! assert!(validate_font_url("https://fonts.test/great-vibes.woff2").is_ok());
//! assert!(validate_font_url("http://localhost/font.woff2").is_err());
//! assert_eq!(sanitize_font_name("Great Vibes!"), "Great Vibes");
//! ```

mod audio;
pub mod font;
mod image;
mod listener;
pub mod platform;
mod resource;
mod vector;
mod video;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export public API
pub use audio::AudioLoader;
pub use font::{FontConfig, FontDisplay, FontLoader, LoadedFont};
pub use image::ImageLoader;
pub use listener::ListenerGuard;
pub use platform::{
    ElementHandle, ElementKind, FontHandle, ListenerCallback, ListenerId, MediaElement,
    MediaEvent, MediaPlatform, NativeFontFace, PreloadHint, ReadyState,
};
pub use resource::{LoadedResource, LoaderSet, LoaderTimeouts, FONT_FAMILY_KEY};
pub use vector::{decode_data_uri, is_structurally_valid, MarkupSanitizer, VectorLoader};
pub use video::{LoadedVideo, VideoLoader, VideoReadiness};
