//! Blob URL tracking

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Whether `url` is an object URL created from a blob
pub fn is_blob_url(url: &str) -> bool {
    url.starts_with("blob:")
}

/// Blob URLs handed out for media, with the time each was recorded
#[derive(Debug, Default)]
pub struct BlobTracker {
    created: HashMap<String, Instant>,
}

impl BlobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `url`, returning `false` if it is not a blob URL
    ///
    /// Tracking the same URL again keeps its original creation time.
    pub fn track(&mut self, url: &str) -> bool {
        if !is_blob_url(url) {
            return false;
        }
        self.created
            .entry(url.to_string())
            .or_insert_with(Instant::now);
        true
    }

    pub fn untrack(&mut self, url: &str) -> bool {
        self.created.remove(url).is_some()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.created.contains_key(url)
    }

    /// Remove and return every URL recorded at least `max_age` ago
    pub fn take_stale(&mut self, max_age: Duration) -> Vec<String> {
        let now = Instant::now();
        let stale: Vec<String> = self
            .created
            .iter()
            .filter(|(_, created)| now.duration_since(**created) >= max_age)
            .map(|(url, _)| url.clone())
            .collect();

        for url in &stale {
            self.created.remove(url);
        }
        stale
    }

    /// Remove and return every tracked URL
    pub fn take_all(&mut self) -> Vec<String> {
        self.created.drain().map(|(url, _)| url).collect()
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}
