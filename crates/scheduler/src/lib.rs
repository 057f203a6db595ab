//! Media Preload Scheduler Library
//!
//! Staged, priority-ordered preloading with bounded concurrency and
//! cooperative cancellation.
//!
//! Content is submitted in named stages (for example "critical" and
//! "secondary"). Within a stage items are dispatched by ascending priority
//! tier, FIFO within a tier, with at most `max_concurrent_loads` loads in
//! flight. Every item yields exactly one [`PreloadResult`]; failures are
//! recorded, never fatal to the stage.
//!
//! # Example
//!
//! ```
//! use media_preload_scheduler::{ContentKind, DispatchQueue, PreloadableContent};
//!
//! let mut queue = DispatchQueue::new(vec![
//!     PreloadableContent::new("gallery", ContentKind::Image, "https://cdn.test/g.jpg").with_tier(2),
//!     PreloadableContent::new("hero", ContentKind::Video, "https://cdn.test/hero.mp4"),
//! ]);
//!
//! assert_eq!(queue.pop().unwrap().id, "hero");
//! assert_eq!(queue.pop().unwrap().id, "gallery");
//! ```

mod cancel;
mod error;
mod priority;
mod progress;
mod scheduler;

// Re-export public API
pub use cancel::{CancellationRegistry, CancellationToken};
pub use error::{ErrorKind, MediaError, MediaResult};
pub use priority::{ContentKind, DispatchQueue, PreloadableContent};
pub use progress::{PreloadResult, PreloadStats, StageProgress};
pub use scheduler::{ContentLoader, PreloadScheduler, SchedulerConfig};
