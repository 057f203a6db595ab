//! Media Preload Cache Library
//!
//! Bounded in-memory cache for preloaded media handles with LRU eviction
//! driven by both an entry-count budget and an estimated memory budget.

pub mod estimate;
pub mod lru;
pub mod pressure;

pub use estimate::{
    estimate_bytes, estimate_serialized, SizeHint, AUDIO_ESTIMATE_BYTES, FALLBACK_ESTIMATE_BYTES,
    FONT_ESTIMATE_BYTES, VIDEO_ESTIMATE_BYTES,
};
pub use lru::{CacheStats, CacheValue, MemoryAwareLruCache};
pub use pressure::MemoryPressure;
