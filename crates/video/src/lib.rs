//! Media Preload Video Library
//!
//! Lifecycle management for live video handles: registration under an
//! origin policy, per-environment handle limits with oldest-first eviction,
//! listener and blob URL release, and de-duplication of handles that play
//! the same media.
//!
//! # Example
//!
//! ```
//! use media_preload_video::{Environment, EnvironmentLimits};
//!
//! let limits = EnvironmentLimits::for_environment(Environment::InAppBrowser);
//! assert_eq!(limits.max_videos, 3);
//! assert!(Environment::InAppBrowser.is_constrained());
//! ```

mod arena;
mod blob;
mod env;
mod manager;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export public API
pub use arena::VideoId;
pub use blob::{is_blob_url, BlobTracker};
pub use env::{CapabilityProbe, Environment, EnvironmentLimits};
pub use manager::{
    presence_score, VideoManagerConfig, VideoPlatform, VideoResourceManager, VideoState,
};
