//! Font loader with validation, retry and a concurrency gate
//!
//! Every request is validated before it can reach the platform. Valid
//! requests for the same family and URL are coalesced onto one in-flight
//! load; loads pass through a process-wide semaphore and are retried with
//! exponential backoff. Successes and exhausted failures are both cached,
//! the latter only for a limited window.

mod validate;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use media_preload_cache::{estimate_bytes, CacheValue, MemoryAwareLruCache, SizeHint};
use media_preload_scheduler::{CancellationToken, MediaError, MediaResult};
use tokio::sync::Semaphore;
use tokio::time::Instant;

pub use crate::platform::FontDisplay;
use crate::platform::{FontHandle, MediaPlatform};
pub use validate::{
    sanitize_font_name, validate_font_url, FALLBACK_FAMILY, FONT_EXTENSIONS, FONT_MIME_TYPES,
    MAX_FAMILY_LEN,
};

/// Configuration for font loading
#[derive(Debug, Clone, PartialEq)]
pub struct FontConfig {
    /// Deadline of a single attempt.
    /// Default: 5s.
    pub timeout: Duration,

    /// Retries after the first attempt.
    /// Default: 2.
    pub max_retries: u32,

    pub display: FontDisplay,

    /// Delay before the first retry, doubled for each later one.
    /// Default: 500ms.
    pub backoff_base: Duration,

    /// Font loads allowed in flight at once.
    /// Default: 3.
    pub max_concurrent: usize,

    /// How long an exhausted failure short-circuits new requests.
    /// Default: 60s.
    pub negative_ttl: Duration,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            display: FontDisplay::Swap,
            backoff_base: Duration::from_millis(500),
            max_concurrent: 3,
            negative_ttl: Duration::from_secs(60),
        }
    }
}

impl FontConfig {
    /// Backoff after the given failed attempt (0-based)
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(failed_attempt))
    }
}

/// A registered font face
#[derive(Clone)]
pub struct LoadedFont {
    /// Sanitized family name the face was registered under
    pub family: String,
    pub handle: FontHandle,
    /// Attempts the load took
    pub attempts: u32,
    pub from_cache: bool,
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFont")
            .field("family", &self.family)
            .field("attempts", &self.attempts)
            .field("from_cache", &self.from_cache)
            .finish()
    }
}

#[derive(Clone)]
enum FontCacheEntry {
    Loaded(LoadedFont),
    Failed {
        error: MediaError,
        attempts: u32,
        stored_at: Instant,
    },
}

impl CacheValue for FontCacheEntry {
    fn estimated_bytes(&self) -> usize {
        match self {
            FontCacheEntry::Loaded(_) => estimate_bytes(SizeHint::Font),
            FontCacheEntry::Failed { .. } => estimate_bytes(SizeHint::Unknown),
        }
    }

    fn release(&self) {
        if let FontCacheEntry::Loaded(font) = self {
            font.handle.release();
        }
    }

    fn is_usable(&self) -> bool {
        match self {
            FontCacheEntry::Loaded(font) => !font.handle.is_released(),
            FontCacheEntry::Failed { .. } => true,
        }
    }
}

type SharedLoad = Shared<BoxFuture<'static, MediaResult<LoadedFont>>>;

struct Inner {
    platform: Arc<dyn MediaPlatform>,
    config: FontConfig,
    gate: Semaphore,
    cache: MemoryAwareLruCache<FontCacheEntry>,
    in_flight: Mutex<HashMap<String, SharedLoad>>,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, SharedLoad>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load_with_retries(&self, family: String, url: String, key: String) -> MediaResult<LoadedFont> {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 0;

        let error = loop {
            attempt += 1;
            let outcome = {
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .map_err(|_| MediaError::Aborted)?;
                let register = self
                    .platform
                    .load_font_face(&family, &url, self.config.display);
                match tokio::time::timeout(self.config.timeout, register).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(MediaError::Timeout(self.config.timeout)),
                }
            };

            match outcome {
                Ok(handle) => {
                    let font = LoadedFont {
                        family,
                        handle,
                        attempts: attempt,
                        from_cache: false,
                    };
                    tracing::info!(family = %font.family, attempts = attempt, "font loaded");
                    self.cache.set(key, FontCacheEntry::Loaded(font.clone()));
                    return Ok(font);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = self.config.backoff(attempt - 1);
                    tracing::warn!(%family, attempt, ?backoff, error = %err, "font load failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => break err,
            }
        };

        tracing::warn!(%family, %url, attempts = attempt, error = %error, "font load gave up");
        self.cache.set(
            key,
            FontCacheEntry::Failed {
                error: error.clone(),
                attempts: attempt,
                stored_at: Instant::now(),
            },
        );
        Err(error)
    }
}

/// Removes the in-flight entry once nobody waits on it any more
struct WaitGuard<'a> {
    inner: &'a Inner,
    key: &'a str,
    shared: Option<SharedLoad>,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let Some(ours) = self.shared.take() else {
            return;
        };
        let mut in_flight = self.inner.in_flight();
        let Some(current) = in_flight.get(self.key) else {
            return;
        };
        if !current.ptr_eq(&ours) {
            return;
        }

        // Settled loads report no count; otherwise the map and `ours` remain
        let orphaned = ours.strong_count().map_or(true, |count| count <= 2);
        if orphaned {
            in_flight.remove(self.key);
        }
    }
}

/// Font loader
///
/// Cheap to clone; clones share the gate, cache and in-flight loads.
#[derive(Clone)]
pub struct FontLoader {
    inner: Arc<Inner>,
}

impl FontLoader {
    pub fn new(platform: Arc<dyn MediaPlatform>, config: FontConfig) -> Self {
        let gate = Semaphore::new(config.max_concurrent.max(1));
        Self {
            inner: Arc::new(Inner {
                platform,
                config,
                gate,
                cache: MemoryAwareLruCache::with_mb_limit(64, 16),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Load the font at `url` under family `name`
    ///
    /// Invalid URLs fail with `InvalidUrl` without any platform call.
    pub async fn load(&self, url: &str, name: &str, token: &CancellationToken) -> MediaResult<LoadedFont> {
        validate_font_url(url)?;
        let family = sanitize_font_name(name);
        let key = format!("{family}|{url}");

        if let Some(entry) = self.inner.cache.get(&key) {
            match entry {
                FontCacheEntry::Loaded(font) => {
                    return Ok(LoadedFont {
                        from_cache: true,
                        ..font
                    })
                }
                FontCacheEntry::Failed {
                    error, stored_at, ..
                } if stored_at.elapsed() < self.inner.config.negative_ttl => {
                    tracing::debug!(%family, url, "font failure still cached");
                    return Err(error);
                }
                FontCacheEntry::Failed { .. } => {
                    self.inner.cache.delete(&key);
                }
            }
        }

        let shared = self
            .inner
            .in_flight()
            .entry(key.clone())
            .or_insert_with(|| {
                let inner = self.inner.clone();
                let (family, url, key) = (family.clone(), url.to_string(), key.clone());
                async move { inner.load_with_retries(family, url, key).await }
                    .boxed()
                    .shared()
            })
            .clone();

        let _guard = WaitGuard {
            inner: &self.inner,
            key: &key,
            shared: Some(shared.clone()),
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(MediaError::Aborted),
            outcome = shared => outcome,
        }
    }

    /// Attempts recorded by a cached failure for this family and URL
    pub fn failed_attempts(&self, name: &str, url: &str) -> Option<u32> {
        let key = format!("{}|{url}", sanitize_font_name(name));
        match self.inner.cache.get(&key)? {
            FontCacheEntry::Failed { attempts, .. } => Some(attempts),
            FontCacheEntry::Loaded(_) => None,
        }
    }

    /// Number of distinct loads currently in flight
    pub fn pending_loads(&self) -> usize {
        self.inner.in_flight().len()
    }

    /// Drop every cached font, releasing registered faces
    pub fn clear(&self) {
        self.inner.cache.clear();
    }

    pub fn config(&self) -> &FontConfig {
        &self.inner.config
    }
}
