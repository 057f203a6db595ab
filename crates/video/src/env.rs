//! Runtime environment detection and per-environment limits
//!
//! Mobile devices and in-app browsers get fewer live video handles, shorter
//! cleanup deadlines, longer settle delays and delayed blob release.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Device capabilities reported by the host
///
/// Every method may return `None`; unknown capabilities never push
/// detection away from desktop.
pub trait CapabilityProbe: Send + Sync {
    fn user_agent(&self) -> Option<String>;

    /// Viewport width in CSS pixels
    fn screen_width(&self) -> Option<u32>;

    /// Whether the primary pointer is coarse (touch)
    fn coarse_pointer(&self) -> Option<bool>;

    /// Approximate device memory in gigabytes
    fn device_memory_gb(&self) -> Option<f32>;
}

/// Class of runtime the session runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    #[default]
    Desktop,
    Mobile,
    /// Embedded web view of a social or messaging app
    InAppBrowser,
}

const IN_APP_PATTERN: &str =
    r"(?i)\b(FBAN|FBAV|Instagram|Line/|Twitter|MicroMessenger|WhatsApp|TikTok|musical_ly|Snapchat|LinkedInApp|GSA/)|; wv\)";

const MOBILE_PATTERN: &str =
    r"(?i)Android|iPhone|iPad|iPod|Mobile|webOS|BlackBerry|IEMobile|Opera Mini";

/// Widest viewport still treated as a phone or tablet
const MOBILE_MAX_WIDTH: u32 = 768;

/// Devices at or below this much memory get mobile limits
const LOW_MEMORY_GB: f32 = 2.0;

fn is_match_cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str, haystack: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(haystack))
}

impl Environment {
    /// Classify the runtime from whatever the probe can tell
    pub fn detect(probe: &dyn CapabilityProbe) -> Self {
        static IN_APP: OnceLock<Option<Regex>> = OnceLock::new();
        static MOBILE: OnceLock<Option<Regex>> = OnceLock::new();

        if let Some(agent) = probe.user_agent() {
            if is_match_cached(&IN_APP, IN_APP_PATTERN, &agent) {
                return Environment::InAppBrowser;
            }
            if is_match_cached(&MOBILE, MOBILE_PATTERN, &agent) {
                return Environment::Mobile;
            }
        }

        let touch_sized = probe.coarse_pointer() == Some(true)
            && probe
                .screen_width()
                .is_some_and(|width| width <= MOBILE_MAX_WIDTH);
        let low_memory = probe
            .device_memory_gb()
            .is_some_and(|memory| memory <= LOW_MEMORY_GB);

        if touch_sized || low_memory {
            Environment::Mobile
        } else {
            Environment::Desktop
        }
    }

    pub fn is_constrained(self) -> bool {
        self != Environment::Desktop
    }
}

/// Resource limits applied by the video manager
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentLimits {
    /// Live video handles allowed at once
    pub max_videos: usize,
    /// Oldest registrations evicted when the limit is reached
    pub eviction_batch: usize,
    /// Deadline of a single cleanup
    pub cleanup_timeout: Duration,
    /// Wait after pausing before the source is cleared
    pub settle_delay: Duration,
    /// Delay before a blob URL is revoked, zero for immediately
    pub blob_release_delay: Duration,
    /// Age after which a tracked blob URL is swept
    pub stale_blob_after: Duration,
    /// Videos cleaned per batch by `cleanup_all_videos`, `None` for all at once
    pub cleanup_batch_size: Option<usize>,
    /// Pause between cleanup batches
    pub batch_pause: Duration,
}

impl EnvironmentLimits {
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Desktop => Self {
                max_videos: 10,
                eviction_batch: 1,
                cleanup_timeout: Duration::from_secs(5),
                settle_delay: Duration::from_millis(50),
                blob_release_delay: Duration::ZERO,
                stale_blob_after: Duration::from_secs(5 * 60),
                cleanup_batch_size: None,
                batch_pause: Duration::ZERO,
            },
            Environment::Mobile => Self {
                max_videos: 5,
                eviction_batch: 2,
                cleanup_timeout: Duration::from_secs(3),
                settle_delay: Duration::from_millis(150),
                blob_release_delay: Duration::from_secs(1),
                stale_blob_after: Duration::from_secs(2 * 60),
                cleanup_batch_size: Some(3),
                batch_pause: Duration::from_millis(100),
            },
            Environment::InAppBrowser => Self {
                max_videos: 3,
                eviction_batch: 2,
                cleanup_timeout: Duration::from_secs(2),
                settle_delay: Duration::from_millis(200),
                blob_release_delay: Duration::from_secs(1),
                stale_blob_after: Duration::from_secs(60),
                cleanup_batch_size: Some(2),
                batch_pause: Duration::from_millis(150),
            },
        }
    }
}

impl Default for EnvironmentLimits {
    fn default() -> Self {
        Self::for_environment(Environment::Desktop)
    }
}
