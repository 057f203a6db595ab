//! Media Preload Core Library
//!
//! Ties the preload crates together behind [`PreloadSession`]: configuration,
//! URL normalization, staged preloading and video registration for one page
//! context.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use media_preload_core::PreloadConfig;
//!
//! let config = PreloadConfig::default()
//!     .with_cache_mb(64)
//!     .with_readiness_fallback(Duration::from_secs(10));
//!
//! assert_eq!(config.scheduler_config().readiness_fallback, Duration::from_secs(10));
//! ```

pub mod config;
pub mod logging;
pub mod session;

// Re-export public API
pub use config::{ConfigError, PreloadConfig};
pub use logging::init_logging;
pub use session::{BaseUrlResolver, PreloadSession, SessionCollaborators, UrlResolver};

pub use media_preload_cache as cache;
pub use media_preload_loaders as loaders;
pub use media_preload_scheduler as scheduler;
pub use media_preload_video as video;
