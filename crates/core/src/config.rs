//! Preload configuration for cache budgets, concurrency and deadlines.
//!
//! Configuration can be created programmatically, loaded from environment
//! variables, or read from a flat `key = value` file. Each crate's own
//! configuration is derived from it.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use media_preload_cache::{CacheValue, MemoryAwareLruCache};
use media_preload_loaders::{FontConfig, LoaderTimeouts};
use media_preload_scheduler::SchedulerConfig;
use media_preload_video::{Environment, VideoManagerConfig};

const MB: usize = 1024 * 1024;

/// Configuration for a preload session.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadConfig {
    /// Entries the resource cache may hold
    pub cache_max_items: usize,
    /// Estimated memory budget of the resource cache in bytes
    pub cache_max_memory: usize,
    /// Loads in flight at once across a stage
    pub max_concurrent_loads: usize,
    /// Time after stage start at which critical content counts as ready
    pub readiness_fallback: Duration,
    /// Deadline of one image, video, audio or vector load
    pub load_timeout: Duration,
    /// Retries after a failed font attempt
    pub font_retries: u32,
    /// Origins besides the app's own whose videos may be registered
    pub trusted_origins: Vec<String>,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            cache_max_items: 50,
            cache_max_memory: 100 * MB,
            max_concurrent_loads: 4,
            readiness_fallback: Duration::from_secs(15),
            load_timeout: Duration::from_secs(15),
            font_retries: 2,
            trusted_origins: Vec::new(),
        }
    }
}

impl PreloadConfig {
    /// Sets the cache entry budget.
    pub fn with_cache_items(mut self, items: usize) -> Self {
        self.cache_max_items = items;
        self
    }

    /// Sets the cache memory budget in megabytes.
    pub fn with_cache_mb(mut self, mb: usize) -> Self {
        self.cache_max_memory = mb.saturating_mul(MB);
        self
    }

    pub fn with_max_concurrent_loads(mut self, limit: usize) -> Self {
        self.max_concurrent_loads = limit.max(1);
        self
    }

    pub fn with_readiness_fallback(mut self, fallback: Duration) -> Self {
        self.readiness_fallback = fallback;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_font_retries(mut self, retries: u32) -> Self {
        self.font_retries = retries;
        self
    }

    pub fn with_trusted_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the cache memory budget in whole megabytes.
    pub fn cache_mb(&self) -> usize {
        self.cache_max_memory / MB
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MEDIA_PRELOAD_CACHE_ITEMS`: cache entry budget (default: 50)
    /// - `MEDIA_PRELOAD_CACHE_MB`: cache memory budget in MB (default: 100)
    /// - `MEDIA_PRELOAD_MAX_CONCURRENT`: concurrent loads (default: 4)
    /// - `MEDIA_PRELOAD_FALLBACK_MS`: critical readiness fallback (default: 15000)
    /// - `MEDIA_PRELOAD_LOAD_TIMEOUT_MS`: per-load deadline (default: 15000)
    /// - `MEDIA_PRELOAD_FONT_RETRIES`: font retries (default: 2)
    /// - `MEDIA_PRELOAD_TRUSTED_ORIGINS`: comma-separated origins
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (var, key) in ENV_KEYS {
            if let Ok(value) = std::env::var(var) {
                config
                    .apply(key, &value)
                    .map_err(|_| ConfigError::InvalidValue(var.to_string()))?;
            }
        }

        Ok(config)
    }

    /// Loads configuration from a `key = value` file.
    ///
    /// Expected file format:
    /// ```text
    /// cache_items = 50
    /// cache_bytes = 104857600
    /// max_concurrent_loads = 4
    /// readiness_fallback_ms = 15000
    /// load_timeout_ms = 15000
    /// font_retries = 2
    /// trusted_origins = "https://cdn.example,https://media.example"
    /// ```
    ///
    /// `cache_mb = 100` is accepted in place of `cache_bytes`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a value is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    /// Parses configuration from `key = value` lines; unknown keys are ignored.
    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.apply(key.trim(), value.trim().trim_matches('"'))?;
            }
        }

        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        }

        match key {
            "cache_items" => self.cache_max_items = number(key, value)?,
            "cache_mb" => {
                self.cache_max_memory = number::<usize>(key, value)?
                    .checked_mul(MB)
                    .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))?
            }
            "cache_bytes" => self.cache_max_memory = number(key, value)?,
            "max_concurrent_loads" => {
                self.max_concurrent_loads = number::<usize>(key, value)?.max(1)
            }
            "readiness_fallback_ms" => {
                self.readiness_fallback = Duration::from_millis(number(key, value)?)
            }
            "load_timeout_ms" => self.load_timeout = Duration::from_millis(number(key, value)?),
            "font_retries" => self.font_retries = number(key, value)?,
            "trusted_origins" => {
                self.trusted_origins = value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            _ => {}
        }
        Ok(())
    }

    /// Saves configuration to a `key = value` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_file_contents())?;
        Ok(())
    }

    fn to_file_contents(&self) -> String {
        format!(
            "# Media preload configuration\n\
             cache_items = {}\n\
             cache_bytes = {}\n\
             max_concurrent_loads = {}\n\
             readiness_fallback_ms = {}\n\
             load_timeout_ms = {}\n\
             font_retries = {}\n\
             trusted_origins = \"{}\"\n",
            self.cache_max_items,
            self.cache_max_memory,
            self.max_concurrent_loads,
            self.readiness_fallback.as_millis(),
            self.load_timeout.as_millis(),
            self.font_retries,
            self.trusted_origins.join(","),
        )
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_max_concurrent_loads(self.max_concurrent_loads)
            .with_readiness_fallback(self.readiness_fallback)
    }

    pub fn loader_timeouts(&self) -> LoaderTimeouts {
        LoaderTimeouts::uniform(self.load_timeout)
    }

    pub fn font_config(&self) -> FontConfig {
        FontConfig {
            max_retries: self.font_retries,
            ..FontConfig::default()
        }
    }

    /// Video manager configuration with limits for `environment`
    pub fn video_config(&self, environment: Environment) -> VideoManagerConfig {
        VideoManagerConfig::for_environment(environment)
            .with_trusted_origins(self.trusted_origins.iter().cloned())
    }

    /// An empty cache with this configuration's budgets
    pub fn build_cache<V: CacheValue>(&self) -> MemoryAwareLruCache<V> {
        MemoryAwareLruCache::new(self.cache_max_items, self.cache_max_memory)
    }
}

const ENV_KEYS: [(&str, &str); 7] = [
    ("MEDIA_PRELOAD_CACHE_ITEMS", "cache_items"),
    ("MEDIA_PRELOAD_CACHE_MB", "cache_mb"),
    ("MEDIA_PRELOAD_MAX_CONCURRENT", "max_concurrent_loads"),
    ("MEDIA_PRELOAD_FALLBACK_MS", "readiness_fallback_ms"),
    ("MEDIA_PRELOAD_LOAD_TIMEOUT_MS", "load_timeout_ms"),
    ("MEDIA_PRELOAD_FONT_RETRIES", "font_retries"),
    ("MEDIA_PRELOAD_TRUSTED_ORIGINS", "trusted_origins"),
];

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing a configuration file
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
